//! Fake `unrar` executables for extraction tests.

#[cfg(unix)]
use std::path::{Path, PathBuf};

#[cfg(unix)]
use crate::mediainfo::write_script;

/// Payload the fake tool writes for every archive it is asked to extract.
pub const EXTRACTED_PAYLOAD: &str = "unpacked video";

/// Write a script that behaves like `unrar x -o+ -y -idq <archive> <dest>/`: it writes
/// `<archive stem>.mkv` holding [`EXTRACTED_PAYLOAD`] into the destination.
///
/// # Errors
///
/// Returns an error when the script cannot be written.
#[cfg(unix)]
pub fn write_fake_unrar(dir: &Path) -> anyhow::Result<PathBuf> {
    write_script(
        dir,
        "unrar",
        &format!(
            "#!/bin/sh\n\
             name=$(basename \"$5\")\n\
             printf '%s' '{EXTRACTED_PAYLOAD}' > \"$6${{name%.*}}.mkv\"\n"
        ),
    )
}

/// Write a script that reports a corrupt archive and exits with `code`.
///
/// # Errors
///
/// Returns an error when the script cannot be written.
#[cfg(unix)]
pub fn write_failing_unrar(dir: &Path, code: i32) -> anyhow::Result<PathBuf> {
    write_script(
        dir,
        "unrar-fail",
        &format!("#!/bin/sh\necho 'CRC failed' >&2\nexit {code}\n"),
    )
}
