// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::db::{KeyValueStore, KeyValueStoreExt};

pub fn read_bin<DB>(db: &DB)
where
    DB: KeyValueStore,
{
    let key = "0";
    let value = [1];
    db.write_bin(key, &value).unwrap();
    let res = db.read_bin(key).unwrap().unwrap();
    assert_eq!(value.as_ref(), res.as_slice());
}

pub fn write_read_obj<DB>(db: &DB)
where
    DB: KeyValueStore,
{
    let key = "IAH-20080430204825-00000-blackbook.arc";
    let value = 42;
    db.write_obj(key, &value).unwrap();
    let res: i32 = db.read_obj(key).unwrap().unwrap();
    assert_eq!(value, res);

    // file states are rewritten on every transition, so values must be
    // overwritable
    let value = 1337;
    db.write_obj(key, &value).unwrap();
    let res: i32 = db.read_obj(key).unwrap().unwrap();
    assert_eq!(value, res);
}

pub fn exists<DB>(db: &DB)
where
    DB: KeyValueStore,
{
    let key = "0";
    let value = [1];
    db.write_bin(key, &value).unwrap();
    let res = db.exists(key).unwrap();
    assert!(res);
}

pub fn does_not_exist<DB>(db: &DB)
where
    DB: KeyValueStore,
{
    let key = "missing.warc.gz";

    assert!(!db.exists(key).unwrap());
    assert!(db.read_obj::<i32>(key).unwrap().is_none());
    assert!(db.require_obj::<i32>(key).is_err());
}

pub fn list_keys<DB>(db: &DB)
where
    DB: KeyValueStore,
{
    for key in ["b.warc", "a.arc", "c.warc.gz"] {
        db.write_bin(key, b"{}").unwrap();
    }
    let mut keys = db.keys().unwrap();
    keys.sort();
    assert_eq!(keys, vec!["a.arc", "b.warc", "c.warc.gz"]);
}
