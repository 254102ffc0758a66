use std::ffi::OsString;
use std::path::Path;

pub fn path_to_os_string(path: &Path) -> OsString {
    path.as_os_str().to_os_string()
}
