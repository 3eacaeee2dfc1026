use std::env;

use fit_sdk::WorkdirGuard;

// One test only: the working directory is shared by every test thread in
// this binary.
#[test]
fn guard_restores_directory_on_every_exit_path() {
    let start = env::current_dir().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().canonicalize().unwrap();

    {
        let guard = WorkdirGuard::enter(&target).unwrap();
        assert_eq!(env::current_dir().unwrap().canonicalize().unwrap(), target);
        assert_eq!(guard.previous(), start.as_path());
    }
    assert_eq!(env::current_dir().unwrap(), start);

    let result = std::panic::catch_unwind(|| {
        let _guard = WorkdirGuard::enter(&target).unwrap();
        panic!("operation failed");
    });
    assert!(result.is_err());
    assert_eq!(env::current_dir().unwrap(), start);

    assert!(WorkdirGuard::enter(&target.join("does-not-exist")).is_err());
    assert_eq!(env::current_dir().unwrap(), start);
}
