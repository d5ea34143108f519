//! Fake `mediainfo` executables for extractor and runner tests.

use std::fs;
use std::path::{Path, PathBuf};

/// Report printed by [`write_fake_mediainfo`]; `$1` is the analysed path.
pub const SAMPLE_REPORT: &str = "General
Complete name                            : $1
Format                                   : Matroska
File size                                : 700 MiB
Duration                                 : 1h 2mn 3s

Video
ID                                       : 1
Format                                   : AVC
Codec ID                                 : V_MPEG4/ISO/AVC
Width                                    : 1 280 pixels
Height                                   : 720 pixels

Audio
Format                                   : AC-3
";

/// Write an executable shell script that prints `report` and exits 0.
///
/// `$1` inside the report expands to the file argument.
///
/// # Errors
///
/// Returns an error when the script cannot be written.
#[cfg(unix)]
pub fn write_fake_mediainfo(dir: &Path, report: &str) -> anyhow::Result<PathBuf> {
    write_script(
        dir,
        "mediainfo",
        &format!("#!/bin/sh\ncat <<EOF\n{report}EOF\n"),
    )
}

/// Write an executable shell script that exits with `code`.
///
/// # Errors
///
/// Returns an error when the script cannot be written.
#[cfg(unix)]
pub fn write_failing_mediainfo(dir: &Path, code: i32) -> anyhow::Result<PathBuf> {
    write_script(
        dir,
        "mediainfo-fail",
        &format!("#!/bin/sh\necho 'broken' >&2\nexit {code}\n"),
    )
}

#[cfg(unix)]
pub(crate) fn write_script(dir: &Path, name: &str, body: &str) -> anyhow::Result<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    fs::write(&path, body)?;
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
    Ok(path)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn scripts_are_executable() -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir()?;
        let path = write_fake_mediainfo(temp.path(), SAMPLE_REPORT)?;
        let mode = fs::metadata(&path)?.permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
        assert!(fs::read_to_string(&path)?.contains("Codec ID"));
        Ok(())
    }
}
