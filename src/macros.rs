#![allow(unused_macros)]

/// Helper macro for reading locked items
///
/// ```rust, ignore
///  let data = read_lock!(proxy.attributes);
///  println!("{:?}", data.get("owner"));
/// ```
macro_rules! read_lock {
    ($arc_rwlock:expr) => {
        $arc_rwlock.read().expect("Failed to acquire read lock")
    };
}

/// Helper macro for writing to locked items
///
/// ```rust, ignore
///  let mut data = write_lock!(proxy.attributes);
///  data.insert("owner".into(), "7".into());
/// ```
macro_rules! write_lock {
    ($arc_rwlock:expr) => {
        $arc_rwlock.write().expect("Failed to acquire write lock")
    };
}
