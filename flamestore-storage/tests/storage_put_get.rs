// Copyright 2025 Flamestore (https://github.com/flamestore)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Integration tests for ingestion, range queries and persistence

use chrono::{DateTime, Utc};
use flamestore_core::{Key, Tree};
use flamestore_storage::{GetInput, PutInput, Storage, StorageConfig, WritePolicy};
use prometheus::Registry;
use tempfile::tempdir;

fn simple_time(secs: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(secs, 0).unwrap()
}

fn tree(stack: &[u8], samples: u64) -> Tree {
    let mut tree = Tree::new();
    tree.insert(stack, samples);
    tree
}

fn put(storage: &Storage, key: &str, start: i64, end: i64, val: Tree) {
    storage
        .put(&PutInput {
            start_time: simple_time(start),
            end_time: simple_time(end),
            key: Key::parse(key).unwrap(),
            val,
            spy_name: "testspy".to_string(),
            sample_rate: 100,
        })
        .unwrap();
}

fn samples(storage: &Storage, key: &str, start: i64, end: i64) -> Option<u64> {
    storage
        .get(&GetInput {
            start_time: simple_time(start),
            end_time: simple_time(end),
            key: Key::parse(key).unwrap(),
        })
        .unwrap()
        .map(|out| out.tree.samples())
}

#[test]
fn test_put_get_roundtrip() {
    let dir = tempdir().unwrap();
    let storage = Storage::open(dir.path(), &Registry::new()).unwrap();
    put(&storage, "my.app.cpu{foo=bar}", 10, 19, tree(b"main;work", 5));

    let out = storage
        .get(&GetInput {
            start_time: simple_time(0),
            end_time: simple_time(60),
            key: Key::parse("my.app.cpu").unwrap(),
        })
        .unwrap()
        .unwrap();
    assert_eq!(out.tree, tree(b"main;work", 5));
    assert_eq!(out.spy_name, "testspy");
    assert_eq!(out.sample_rate, 100);
}

#[test]
fn test_get_across_resolutions() {
    let dir = tempdir().unwrap();
    let storage = Storage::open(dir.path(), &Registry::new()).unwrap();

    // One sample every 10 seconds for 30 minutes
    for i in 0..180 {
        put(&storage, "app", i * 10, i * 10 + 10, tree(b"main", 1));
    }

    assert_eq!(samples(&storage, "app", 0, 1800), Some(180));
    assert_eq!(samples(&storage, "app", 0, 1000), Some(100));
    assert_eq!(samples(&storage, "app", 95, 1205), Some(112));
    assert_eq!(samples(&storage, "app", 1800, 3600), Some(0));

    // Whole depth-2 bucket answered by one rollup tree
    let plan = storage
        .query_plan("app{}", simple_time(0), simple_time(1000))
        .unwrap();
    assert_eq!(plan.len(), 1);
    assert_eq!(plan[0].depth, 2);
}

#[test]
fn test_label_enumeration() {
    let dir = tempdir().unwrap();
    let storage = Storage::open(dir.path(), &Registry::new()).unwrap();
    put(&storage, "api.cpu{env=prod,region=eu}", 10, 19, tree(b"a", 1));
    put(&storage, "api.cpu{env=dev}", 10, 19, tree(b"a", 1));
    put(&storage, "db.cpu{env=prod}", 10, 19, tree(b"a", 1));

    assert_eq!(storage.get_app_names().unwrap(), vec!["api.cpu", "db.cpu"]);
    assert_eq!(storage.label_keys().unwrap(), vec!["__name__", "env", "region"]);
    assert_eq!(storage.label_values("env").unwrap(), vec!["dev", "prod"]);
    assert_eq!(storage.label_values("region").unwrap(), vec!["eu"]);
    assert!(storage.label_values("missing").unwrap().is_empty());

    storage.delete_app("api.cpu").unwrap();
    assert_eq!(storage.label_keys().unwrap(), vec!["__name__", "env"]);
    assert_eq!(storage.label_values("env").unwrap(), vec!["prod"]);
}

#[test]
fn test_close_and_reopen() {
    let dir = tempdir().unwrap();
    {
        let storage = Storage::open(dir.path(), &Registry::new()).unwrap();
        put(&storage, "app{env=prod}", 10, 19, tree(b"main;work", 2));
        put(&storage, "app{env=prod}", 20, 29, tree(b"main;idle", 3));
        storage.close().unwrap();
        assert!(storage.is_shutdown());
    }

    let storage = Storage::open(dir.path(), &Registry::new()).unwrap();
    assert_eq!(storage.get_app_names().unwrap(), vec!["app"]);
    assert_eq!(samples(&storage, "app{env=prod}", 0, 100), Some(5));

    // Writes keep merging into the persisted rollups
    put(&storage, "app{env=prod}", 30, 39, tree(b"main;work", 1));
    assert_eq!(samples(&storage, "app", 0, 100), Some(6));
}

#[test]
fn test_drop_flushes_write_back_caches() {
    let dir = tempdir().unwrap();
    {
        let storage = Storage::open(dir.path(), &Registry::new()).unwrap();
        put(&storage, "app", 10, 19, tree(b"main", 4));
    }

    let storage = Storage::open(dir.path(), &Registry::new()).unwrap();
    assert_eq!(samples(&storage, "app", 0, 100), Some(4));
}

#[test]
fn test_small_caches_spill_to_backend() {
    let dir = tempdir().unwrap();
    let mut config = StorageConfig::with_data_dir(dir.path());
    config.cache.trees_capacity = 4;
    config.cache.segments_capacity = 2;
    config.cache.dimensions_capacity = 2;
    let storage = Storage::new(config, &Registry::new()).unwrap();

    for app in ["a", "b", "c", "d"] {
        for i in 0..20 {
            put(&storage, app, i * 10, i * 10 + 10, tree(b"main", 1));
        }
    }

    for app in ["a", "b", "c", "d"] {
        assert_eq!(samples(&storage, app, 0, 200), Some(20), "app {}", app);
    }
    assert_eq!(storage.get_app_names().unwrap(), vec!["a", "b", "c", "d"]);
    assert!(storage.trees().size() <= 4);

    storage.delete_app("b").unwrap();
    assert_eq!(storage.get_app_names().unwrap(), vec!["a", "c", "d"]);
    assert_eq!(samples(&storage, "b", 0, 200), None);
    assert!(storage.trees().keys_with_prefix("b{}").unwrap().is_empty());
}

#[test]
fn test_write_through_persists_every_put() {
    let dir = tempdir().unwrap();
    let mut config = StorageConfig::with_data_dir(dir.path());
    config.write_policy = WritePolicy::WriteThrough;
    let storage = Storage::new(config, &Registry::new()).unwrap();
    put(&storage, "app", 10, 19, tree(b"main", 1));

    assert_eq!(storage.trees().keys_with_prefix("").unwrap(), vec!["app{}:0:10"]);
    assert_eq!(storage.segments().keys_with_prefix("").unwrap(), vec!["app{}"]);
}

#[test]
fn test_concurrent_puts() {
    let dir = tempdir().unwrap();
    let storage = Storage::open(dir.path(), &Registry::new()).unwrap();

    std::thread::scope(|scope| {
        for worker in 0..4 {
            let storage = &storage;
            scope.spawn(move || {
                for i in 0..25 {
                    let key = format!("app{{worker=w{}}}", worker);
                    put(storage, &key, i * 10, i * 10 + 10, tree(b"main;work", 1));
                    storage.get_app_names().unwrap();
                }
            });
        }
    });

    assert_eq!(samples(&storage, "app", 0, 250), Some(100));
    assert_eq!(storage.lookup_app_dimension("app").unwrap().unwrap().len(), 4);
    assert_eq!(storage.metrics().puts.get(), 100);
}
