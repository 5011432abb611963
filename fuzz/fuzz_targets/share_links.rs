#![no_main]

use libfuzzer_sys::fuzz_target;
use tonalhub::query::{Location, QueryStateStore};

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    let (href, values) = text.split_once('\n').unwrap_or((text.as_ref(), "user\nrepo"));
    let (user, repository) = values.split_once('\n').unwrap_or((values, values));

    let mut store = QueryStateStore::new(Location::new(href));
    let _ = store.read();
    store.write(user, repository);
    if !user.trim().is_empty() && !repository.trim().is_empty() {
        let shared = store.read().expect("written pair reads back");
        assert_eq!(shared.user, user);
        assert_eq!(shared.repository, repository);
    }
    store.clear();
    assert!(store.read().is_none());
});
