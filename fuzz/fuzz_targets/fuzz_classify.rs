#![no_main]
use libfuzzer_sys::fuzz_target;
use vfs_bridge::FileRole;

fuzz_target!(|input: (i32, String)| {
    let (flags, name) = input;

    let by_flags = FileRole::from_flags(flags);
    assert_eq!(FileRole::from_code(by_flags.code()), Some(by_flags));

    let by_name = FileRole::from_name(&name);
    assert_ne!(by_name, FileRole::Unknown);
    if name.ends_with("-journal") {
        assert_eq!(by_name, FileRole::Journal);
    }
});
