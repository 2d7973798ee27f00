use std::path::{Path, PathBuf};

use anyhow::Context as _;
use tracing::debug;

use crate::foundation::core::Fps;
use crate::foundation::error::ReclockResult;

/// Tail padding appended to every scene so closing animations settle on film.
pub const DEFAULT_EXTRA_SECONDS: f64 = 0.5;

/// Duration assumed for scenes that do not declare one.
pub const DEFAULT_DURATION_SECONDS: f64 = 10.0;

/// Lifecycle of one scene job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
}

/// One unit of work: render and capture one scene to one video artifact.
#[derive(Clone, Debug, serde::Serialize)]
pub struct SceneJob {
    /// Scene identifier (file stem, e.g. `01-hook`); also names the artifact.
    pub id: String,
    pub source: PathBuf,
    pub duration_seconds: f64,
    /// `ceil((duration + extra) * fps)`.
    pub total_frames: u64,
    pub status: JobStatus,
}

impl SceneJob {
    pub fn new(id: impl Into<String>, source: impl Into<PathBuf>, duration_seconds: f64, fps: Fps, extra_seconds: f64) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            duration_seconds,
            total_frames: total_frames(duration_seconds, extra_seconds, fps),
            status: JobStatus::Pending,
        }
    }
}

/// Frame budget for a scene of `duration_seconds` with tail padding.
pub fn total_frames(duration_seconds: f64, extra_seconds: f64, fps: Fps) -> u64 {
    ((duration_seconds + extra_seconds) * fps.as_f64()).ceil().max(0.0) as u64
}

/// Scene files follow a two-digit ordering convention: `NN-<name>.html`.
pub fn is_scene_file(name: &str) -> bool {
    let Some(stem) = name.strip_suffix(".html") else {
        return false;
    };
    let bytes = stem.as_bytes();
    bytes.len() > 3
        && bytes[0].is_ascii_digit()
        && bytes[1].is_ascii_digit()
        && bytes[2] == b'-'
}

/// Pull the declared duration (seconds) out of a scene's `initScene({...})`
/// call, if present.
pub fn extract_duration(source_text: &str) -> Option<f64> {
    let call = source_text.find("initScene")?;
    let rest = &source_text[call..];
    let open = rest.find('{')?;
    let body = match rest[open..].find('}') {
        Some(close) => &rest[open..open + close],
        None => &rest[open..],
    };
    let key = body.find("duration")?;
    let after = &body[key + "duration".len()..];
    let colon = after.find(':')?;
    parse_leading_number(after[colon + 1..].trim_start())
}

/// Longest `\d+(\.\d+)?` prefix of `text`, if any.
fn parse_leading_number(text: &str) -> Option<f64> {
    let bytes = text.as_bytes();
    let mut end = 0;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == 0 {
        return None;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        let mut frac = end + 1;
        while frac < bytes.len() && bytes[frac].is_ascii_digit() {
            frac += 1;
        }
        if frac > end + 1 {
            end = frac;
        }
    }
    text[..end].parse().ok()
}

/// Discover scene jobs in `dir`, ordered by the two-digit filename prefix.
/// `filter` keeps only scenes whose filename contains the substring
/// (single-scene selection).
pub fn discover_scenes(
    dir: &Path,
    filter: Option<&str>,
    fps: Fps,
    extra_seconds: f64,
) -> ReclockResult<Vec<SceneJob>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("read scene directory '{}'", dir.display()))?;

    let mut names: Vec<String> = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("read scene directory '{}'", dir.display()))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_scene_file(&name) {
            names.push(name);
        }
    }
    names.sort();

    if let Some(f) = filter {
        names.retain(|n| n.contains(f));
    }

    let mut jobs = Vec::with_capacity(names.len());
    for name in names {
        let source = dir.join(&name);
        let text = std::fs::read_to_string(&source)
            .with_context(|| format!("read scene '{}'", source.display()))?;
        let duration = extract_duration(&text).unwrap_or(DEFAULT_DURATION_SECONDS);
        let id = name.trim_end_matches(".html").to_owned();
        debug!(scene = %id, duration, "discovered scene");
        jobs.push(SceneJob::new(id, source, duration, fps, extra_seconds));
    }
    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_frames_ceils_padded_duration() {
        let fps = Fps::new(60, 1).unwrap();
        assert_eq!(total_frames(2.0, 0.5, fps), 150);
        assert_eq!(total_frames(1.01, 0.0, fps), 61);
        assert_eq!(total_frames(0.0, 0.0, fps), 0);
    }

    #[test]
    fn scene_filenames_need_two_digit_prefix() {
        assert!(is_scene_file("01-hook.html"));
        assert!(is_scene_file("12-closing-cta.html"));
        assert!(!is_scene_file("1-hook.html"));
        assert!(!is_scene_file("01-.html"));
        assert!(!is_scene_file("01-hook.htm"));
        assert!(!is_scene_file("hook-01.html"));
        assert!(!is_scene_file("01-hook.html.bak"));
    }

    #[test]
    fn duration_is_parsed_from_init_scene() {
        let html = r#"<script>
          initScene({
            title: "Hook",
            duration: 12.5,
            beats: [0, 4, 8],
          });
        </script>"#;
        assert_eq!(extract_duration(html), Some(12.5));

        assert_eq!(extract_duration("initScene({ duration: 3 })"), Some(3.0));
        assert_eq!(extract_duration("initScene({ title: 'x' })"), None);
        assert_eq!(extract_duration("no scene init at all"), None);
        // Duration outside the initScene object literal is not picked up.
        assert_eq!(
            extract_duration("initScene({ title: 'x' }); var duration = 9;"),
            None
        );
    }

    #[test]
    fn duration_number_must_start_with_a_digit() {
        // Fraction-only values are not valid scene durations.
        assert_eq!(extract_duration("initScene({ duration: .5 })"), None);
        // A trailing dot ends the number rather than poisoning it.
        assert_eq!(
            extract_duration("initScene({ duration: 12.5., x: 1 })"),
            Some(12.5)
        );
        assert_eq!(extract_duration("initScene({ duration: 3. })"), Some(3.0));
    }

    #[test]
    fn discovery_sorts_and_filters() {
        let dir = std::env::temp_dir().join("reclock_scene_discovery");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        for (name, dur) in [
            ("02-problem.html", 4.0),
            ("01-hook.html", 2.0),
            ("10-outro.html", 1.5),
            ("notes.txt", 0.0),
        ] {
            std::fs::write(
                dir.join(name),
                format!("initScene({{ duration: {dur} }})"),
            )
            .unwrap();
        }

        let fps = Fps::new(60, 1).unwrap();
        let jobs = discover_scenes(&dir, None, fps, 0.5).unwrap();
        let ids: Vec<&str> = jobs.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["01-hook", "02-problem", "10-outro"]);
        assert_eq!(jobs[0].duration_seconds, 2.0);
        assert_eq!(jobs[0].total_frames, 150);

        let only = discover_scenes(&dir, Some("02"), fps, 0.5).unwrap();
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].id, "02-problem");
    }
}
