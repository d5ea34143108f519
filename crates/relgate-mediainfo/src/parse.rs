//! Parsing of `mediainfo` text reports.
//!
//! The report is a sequence of sections. A non-empty line without a colon opens
//! a section; every other line is `key : value`. Only the `General` and `Video`
//! sections feed [`MediaCharacteristics`]; all lines end up in the formatted report.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use relgate_core::{MediaCharacteristics, PipelineError, PipelineResult};

static DURATION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(?:(\d+)h\s?)?(?:(\d+)mn\s?)?(?:(\d+)s\s?)?").ok());

/// Parse `1h 2mn 3s` style durations; missing units count as zero and
/// oversized values saturate at `u64::MAX`.
#[must_use]
pub fn parse_duration(value: &str) -> u64 {
    let Some(captures) = DURATION.as_ref().and_then(|re| re.captures(value)) else {
        return 0;
    };
    let unit = |index: usize| {
        captures
            .get(index)
            .and_then(|group| group.as_str().parse::<u64>().ok())
            .unwrap_or(0)
    };
    unit(1)
        .saturating_mul(3600)
        .saturating_add(unit(2).saturating_mul(60))
        .saturating_add(unit(3))
}

/// Parse `1 280 pixels` style dimensions.
#[must_use]
pub fn parse_dimension(value: &str) -> Option<u32> {
    value
        .replace("pixels", "")
        .replace(' ', "")
        .trim()
        .parse()
        .ok()
}

/// Strip `base` from a `Complete name` value so reports do not leak local paths.
#[must_use]
pub fn make_complete_name_relative(path: &str, base: Option<&Path>) -> String {
    let Some(base) = base else {
        return path.to_string();
    };
    let mut prefix = base.to_string_lossy().replace('\\', "/");
    if prefix.is_empty() {
        return path.to_string();
    }
    if !prefix.ends_with('/') {
        prefix.push('/');
    }
    path.replace('\\', "/").replace(&prefix, "")
}

/// Parse a full report for `path`.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidMediaInfo`] when a width or height value is
/// not a number.
pub fn parse_report(
    path: &Path,
    report: &str,
    base: Option<&Path>,
) -> PipelineResult<MediaCharacteristics> {
    let mut record = MediaCharacteristics::new(path);
    let mut formatted = String::with_capacity(report.len() + 64);
    let mut section = "";

    for line in report.lines() {
        if !line.contains(':') {
            if line.is_empty() {
                formatted.push('\n');
            } else {
                section = line;
                formatted.push_str("[b]");
                formatted.push_str(line);
                formatted.push_str("[/b]\n");
            }
            continue;
        }

        let (raw_name, separator, value) = match line.split_once(": ") {
            Some((name, value)) => (name, ": ", value),
            None => (line, "", ""),
        };
        let name = raw_name.trim();
        let mut rendered = None;

        match (section, name) {
            ("General", "Complete name") => {
                rendered = Some(format!(
                    "{raw_name}{separator}{}",
                    make_complete_name_relative(value, base)
                ));
            }
            ("General", "Format") => record.container = value.to_lowercase(),
            ("General", "Duration") => record.duration_in_sec = Some(parse_duration(value)),
            ("Video", "Codec ID") => record.codec = value.to_lowercase(),
            ("Video", "Width") => record.width = dimension(path, "width", value)?,
            ("Video", "Height") => record.height = dimension(path, "height", value)?,
            _ => {}
        }

        formatted.push_str(rendered.as_deref().unwrap_or(line));
        formatted.push('\n');
    }

    record.formatted_report = formatted;
    Ok(record)
}

fn dimension(path: &Path, field: &'static str, value: &str) -> PipelineResult<u32> {
    parse_dimension(value).ok_or_else(|| PipelineError::InvalidMediaInfo {
        path: path.to_path_buf(),
        field,
        value: Some(value.to_string()),
    })
}

/// The validation gate: duration, container and dimensions must be usable.
///
/// Codec is not checked because disc segments often carry none.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidMediaInfo`] naming the first failing attribute.
pub fn validate_media(record: &MediaCharacteristics) -> PipelineResult<()> {
    let invalid = |field: &'static str, value: Option<String>| PipelineError::InvalidMediaInfo {
        path: record.path.clone(),
        field,
        value,
    };

    match record.duration_in_sec {
        None => return Err(invalid("duration", None)),
        Some(0) => return Err(invalid("duration", Some("0".to_string()))),
        Some(_) => {}
    }
    if record.container.is_empty() {
        return Err(invalid("container", None));
    }
    if record.width == 0 {
        return Err(invalid("width", Some(record.width.to_string())));
    }
    if record.height == 0 {
        return Err(invalid("height", Some(record.height.to_string())));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "General
Complete name                            : /srv/work/release/Movie/movie.mkv
Format                                   : Matroska
Duration                                 : 2h 22mn

Video
Codec ID                                 : V_MPEG4/ISO/AVC
Width                                    : 1 280 pixels
Height                                   : 544 pixels
";

    #[test]
    fn durations_follow_unit_grammar() {
        assert_eq!(parse_duration("1h 2mn 3s"), 3723);
        assert_eq!(parse_duration("2mn"), 120);
        assert_eq!(parse_duration(""), 0);
        assert_eq!(parse_duration("45s"), 45);
        assert_eq!(parse_duration("unknown"), 0);
    }

    #[test]
    fn oversized_durations_saturate() {
        assert_eq!(parse_duration("9999999999999999h"), u64::MAX);
        assert_eq!(parse_duration("5124095576030432h 59mn"), u64::MAX);
    }

    #[test]
    fn dimensions_ignore_spaces_and_units() {
        assert_eq!(parse_dimension("1 280 pixels"), Some(1280));
        assert_eq!(parse_dimension("720"), Some(720));
        assert_eq!(parse_dimension("wide"), None);
    }

    #[test]
    fn complete_name_is_made_relative() {
        assert_eq!(
            make_complete_name_relative("/srv/work/release/a.mkv", Some(Path::new("/srv/work/"))),
            "release/a.mkv"
        );
        assert_eq!(
            make_complete_name_relative("C:\\rel\\a.mkv", Some(Path::new("C:\\rel"))),
            "a.mkv"
        );
        assert_eq!(make_complete_name_relative("/x/a.mkv", None), "/x/a.mkv");
    }

    #[test]
    fn report_fields_are_extracted() -> anyhow::Result<()> {
        let record = parse_report(
            Path::new("/srv/work/release/Movie/movie.mkv"),
            REPORT,
            Some(Path::new("/srv/work/release")),
        )?;
        assert_eq!(record.container, "matroska");
        assert_eq!(record.codec, "v_mpeg4/iso/avc");
        assert_eq!(record.width, 1280);
        assert_eq!(record.height, 544);
        assert_eq!(record.duration_in_sec, Some(8520));
        assert!(record.formatted_report.starts_with("[b]General[/b]\n"));
        assert!(record.formatted_report.contains(": Movie/movie.mkv\n"));
        assert!(record.formatted_report.contains("[b]Video[/b]"));
        validate_media(&record)?;
        Ok(())
    }

    #[test]
    fn gate_rejects_unusable_records() {
        let valid = MediaCharacteristics {
            container: "avi".to_string(),
            width: 720,
            height: 480,
            duration_in_sec: Some(10),
            ..MediaCharacteristics::new("a.avi")
        };
        assert!(validate_media(&valid).is_ok());

        let zero_duration = MediaCharacteristics {
            duration_in_sec: Some(0),
            ..valid.clone()
        };
        assert!(matches!(
            validate_media(&zero_duration),
            Err(PipelineError::InvalidMediaInfo { field: "duration", .. })
        ));

        let no_container = MediaCharacteristics {
            container: String::new(),
            ..valid.clone()
        };
        assert!(validate_media(&no_container).is_err());

        let no_width = MediaCharacteristics {
            width: 0,
            ..valid.clone()
        };
        assert!(validate_media(&no_width).is_err());

        let unparsed = MediaCharacteristics {
            duration_in_sec: None,
            ..valid
        };
        assert!(validate_media(&unparsed).is_err());
    }

    #[test]
    fn bad_dimension_is_invalid_media_info() {
        let err = parse_report(Path::new("a.mkv"), "Video\nWidth : wide\n", None)
            .expect_err("width should fail");
        assert!(matches!(
            err,
            PipelineError::InvalidMediaInfo { field: "width", .. }
        ));
    }
}
