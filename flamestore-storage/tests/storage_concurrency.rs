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

//! Concurrent mutations against the orchestrator write lock

use chrono::{DateTime, Utc};
use flamestore_core::{Key, Tree};
use flamestore_storage::{GetInput, PutInput, Storage, StorageError};
use prometheus::Registry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use tempfile::tempdir;

fn simple_time(secs: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(secs, 0).unwrap()
}

fn put_input(key: &str, bucket: i64) -> PutInput {
    let mut val = Tree::new();
    val.insert(b"main;work", 1);
    PutInput {
        start_time: simple_time(bucket * 10),
        end_time: simple_time(bucket * 10 + 10),
        key: Key::parse(key).unwrap(),
        val,
        spy_name: "testspy".to_string(),
        sample_rate: 100,
    }
}

fn samples(storage: &Storage, key: &str, start: i64, end: i64) -> u64 {
    storage
        .get(&GetInput {
            start_time: simple_time(start),
            end_time: simple_time(end),
            key: Key::parse(key).unwrap(),
        })
        .unwrap()
        .map_or(0, |out| out.tree.samples())
}

/// Cross-index invariants that must hold between mutations
fn assert_consistent(storage: &Storage) {
    let segment_keys = storage.segments().keys_with_prefix("").unwrap();

    for dimension_key in storage.dimensions().keys_with_prefix("").unwrap() {
        let dimension = storage.dimensions().lookup(&dimension_key).unwrap().unwrap();
        assert!(!dimension.is_empty(), "empty dimension {}", dimension_key);
        for member in dimension.keys() {
            assert!(segment_keys.iter().any(|k| k == member), "dangling {}", member);
        }
    }

    for segment_key in &segment_keys {
        for dimension_key in Key::parse(segment_key).unwrap().dimension_keys() {
            let dimension = storage.dimensions().lookup(&dimension_key).unwrap().unwrap();
            assert!(dimension.contains(segment_key), "{} misses {}", dimension_key, segment_key);
        }
    }

    for tree_key in storage.trees().keys_with_prefix("").unwrap() {
        let segment_key = tree_key.rsplitn(3, ':').nth(2).unwrap();
        assert!(segment_keys.iter().any(|k| k == segment_key), "orphan tree {}", tree_key);
    }
}

#[test]
fn test_put_racing_delete_app() {
    let dir = tempdir().unwrap();
    let storage = Storage::open(dir.path(), &Registry::new()).unwrap();

    thread::scope(|scope| {
        let storage = &storage;
        scope.spawn(move || {
            for i in 0..100 {
                storage.put(&put_input("app{env=prod}", i)).unwrap();
                storage.put(&put_input("other{env=prod}", i)).unwrap();
            }
        });
        scope.spawn(move || {
            for _ in 0..20 {
                storage.delete_app("app").unwrap();
                thread::yield_now();
            }
        });
    });

    assert_consistent(&storage);
    assert_eq!(samples(&storage, "other", 0, 1000), 100);
    assert!(storage
        .lookup_app_dimension("other")
        .unwrap()
        .unwrap()
        .contains("other{env=prod}"));

    storage.delete_app("app").unwrap();
    assert_consistent(&storage);
    assert_eq!(storage.get_app_names().unwrap(), vec!["other"]);
}

#[test]
fn test_put_racing_close_keeps_acknowledged_writes() {
    let dir = tempdir().unwrap();

    let acknowledged = {
        let storage = Storage::open(dir.path(), &Registry::new()).unwrap();
        let acknowledged = AtomicU64::new(0);

        thread::scope(|scope| {
            for worker in 0..4 {
                let (storage, acknowledged) = (&storage, &acknowledged);
                scope.spawn(move || {
                    let key = format!("app{{worker=w{}}}", worker);
                    for i in 0..200 {
                        match storage.put(&put_input(&key, i)) {
                            Ok(()) => {
                                acknowledged.fetch_add(1, Ordering::SeqCst);
                            }
                            Err(StorageError::Shutdown) => break,
                            Err(e) => panic!("unexpected put error: {}", e),
                        }
                    }
                });
            }

            while acknowledged.load(Ordering::SeqCst) < 20 {
                thread::yield_now();
            }
            storage.close().unwrap();
        });

        assert!(matches!(
            storage.put(&put_input("app{worker=w0}", 0)),
            Err(StorageError::Shutdown)
        ));
        acknowledged.into_inner()
    };

    let storage = Storage::open(dir.path(), &Registry::new()).unwrap();
    assert_eq!(samples(&storage, "app", 0, 2000), acknowledged);
    assert_consistent(&storage);
}
