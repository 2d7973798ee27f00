//! End-to-end recording runs against the built-in synthetic driver, with an
//! in-process sink standing in for the encoder.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reclock::{
    CaptureOpts, FrameFormat, FrameIndex, FrameSink, Fps, JobStatus, NoopProgress, ReclockError,
    ReclockResult, RendererDriver, Resolution, SceneJob, SinkConfig, SyntheticDriver,
    SyntheticDriverOpts, discover_scenes, run_jobs,
};

type FrameStore = Arc<Mutex<HashMap<String, Vec<(u64, Vec<u8>)>>>>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Sink that collects frames into a map shared across workers, keyed by scene.
struct CollectorSink {
    scene_id: String,
    frames: Vec<(u64, Vec<u8>)>,
    store: FrameStore,
}

impl FrameSink for CollectorSink {
    fn begin(&mut self, _cfg: SinkConfig) -> ReclockResult<()> {
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, bytes: &[u8]) -> ReclockResult<()> {
        self.frames.push((idx.0, bytes.to_vec()));
        Ok(())
    }

    fn end(&mut self) -> ReclockResult<()> {
        self.store
            .lock()
            .unwrap()
            .insert(self.scene_id.clone(), std::mem::take(&mut self.frames));
        Ok(())
    }
}

fn scene_dir(tag: &str, scenes: &[(&str, f64)]) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("reclock_smoke_{tag}"));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    for (name, duration) in scenes {
        std::fs::write(
            dir.join(name),
            format!("initScene({{ duration: {duration} }})"),
        )
        .unwrap();
    }
    dir
}

fn small_opts() -> CaptureOpts {
    CaptureOpts {
        fps: Fps::new(5, 1).unwrap(),
        format: FrameFormat::Png,
        resolution: Resolution {
            width: 16,
            height: 10,
        },
        extra_seconds: 0.0,
        warmup_frames: 3,
        load_timeout: Duration::from_secs(5),
    }
}

fn small_driver() -> SyntheticDriver {
    SyntheticDriver::new(SyntheticDriverOpts {
        resolution: Resolution {
            width: 16,
            height: 10,
        },
        format: FrameFormat::Png,
        jpeg_quality: 90,
    })
}

fn run_with_parallelism(dir: &Path, parallelism: usize) -> (reclock::RunReport, FrameStore) {
    let opts = small_opts();
    let jobs = discover_scenes(dir, None, opts.fps, opts.extra_seconds).unwrap();
    let store: FrameStore = Arc::new(Mutex::new(HashMap::new()));

    let make_sink = {
        let store = Arc::clone(&store);
        move |job: &SceneJob| -> ReclockResult<(Box<dyn FrameSink>, PathBuf)> {
            let sink = CollectorSink {
                scene_id: job.id.clone(),
                frames: Vec::new(),
                store: Arc::clone(&store),
            };
            Ok((Box::new(sink), PathBuf::from(format!("{}.mp4", job.id))))
        }
    };

    let report = run_jobs(
        jobs,
        &opts,
        parallelism,
        &|_worker| Ok(Box::new(small_driver())),
        &make_sink,
        &NoopProgress,
    )
    .unwrap();
    (report, store)
}

#[test]
fn parallel_and_sequential_runs_capture_identical_frames() {
    init_tracing();
    let dir = scene_dir(
        "parallel_eq",
        &[
            ("01-hook.html", 0.6),
            ("02-problem.html", 0.4),
            ("03-solution.html", 0.8),
            ("04-outro.html", 0.2),
        ],
    );

    let (seq_report, seq_store) = run_with_parallelism(&dir, 1);
    let (par_report, par_store) = run_with_parallelism(&dir, 3);

    assert_eq!(seq_report.worker_count, 1);
    assert_eq!(par_report.worker_count, 3);
    assert_eq!(seq_report.failed_count(), 0);
    assert_eq!(par_report.failed_count(), 0);

    // Same scenes, in the same (sorted) report order.
    let ids = |r: &reclock::RunReport| -> Vec<String> {
        r.reports.iter().map(|j| j.scene_id.clone()).collect()
    };
    assert_eq!(
        ids(&seq_report),
        vec!["01-hook", "02-problem", "03-solution", "04-outro"]
    );
    assert_eq!(ids(&seq_report), ids(&par_report));

    // Every worker runs an isolated session, so the captured bytes match the
    // sequential run frame for frame.
    let seq = seq_store.lock().unwrap();
    let par = par_store.lock().unwrap();
    assert_eq!(seq.len(), 4);
    for (scene, frames) in seq.iter() {
        assert_eq!(par.get(scene), Some(frames), "frames differ for {scene}");
        // 0.x seconds at 5 fps with no padding.
        assert!(!frames.is_empty());
        for (i, (idx, _)) in frames.iter().enumerate() {
            assert_eq!(*idx, i as u64);
        }
    }
}

/// Driver wrapper that refuses to load scenes whose filename contains `bad`.
struct FlakyDriver(SyntheticDriver);

impl RendererDriver for FlakyDriver {
    fn install_clock(&mut self, fps: Fps) -> ReclockResult<()> {
        self.0.install_clock(fps)
    }

    fn load_scene(&mut self, source: &Path, timeout: Duration) -> ReclockResult<()> {
        if source.to_string_lossy().contains("bad") {
            return Err(ReclockError::driver("renderer crashed while loading"));
        }
        self.0.load_scene(source, timeout)
    }

    fn advance_frame(&mut self) -> ReclockResult<()> {
        self.0.advance_frame()
    }

    fn await_paint_settle(&mut self) -> ReclockResult<()> {
        self.0.await_paint_settle()
    }

    fn capture_frame(&mut self) -> ReclockResult<Vec<u8>> {
        self.0.capture_frame()
    }

    fn dispatch_key(&mut self, key: &str) -> ReclockResult<()> {
        self.0.dispatch_key(key)
    }
}

#[test]
fn one_failing_scene_aborts_its_worker_but_not_siblings() {
    init_tracing();
    let dir = scene_dir(
        "failure_isolation",
        &[
            ("01-hook.html", 0.4),
            ("02-bad.html", 0.4),
            ("03-solution.html", 0.4),
            ("04-outro.html", 0.4),
        ],
    );

    let opts = small_opts();
    let jobs = discover_scenes(&dir, None, opts.fps, opts.extra_seconds).unwrap();
    let store: FrameStore = Arc::new(Mutex::new(HashMap::new()));
    let make_sink = {
        let store = Arc::clone(&store);
        move |job: &SceneJob| -> ReclockResult<(Box<dyn FrameSink>, PathBuf)> {
            let sink = CollectorSink {
                scene_id: job.id.clone(),
                frames: Vec::new(),
                store: Arc::clone(&store),
            };
            Ok((Box::new(sink), PathBuf::from(format!("{}.mp4", job.id))))
        }
    };

    // Round-robin over 2 workers: worker 0 gets 01 and 03, worker 1 gets 02
    // (which fails to load) and 04 (which is then skipped).
    let report = run_jobs(
        jobs,
        &opts,
        2,
        &|_worker| Ok(Box::new(FlakyDriver(small_driver()))),
        &make_sink,
        &NoopProgress,
    )
    .unwrap();

    assert_eq!(report.failed_count(), 2);
    let by_id: HashMap<&str, &reclock::JobReport> = report
        .reports
        .iter()
        .map(|r| (r.scene_id.as_str(), r))
        .collect();

    assert_eq!(by_id["01-hook"].status, JobStatus::Done);
    assert_eq!(by_id["03-solution"].status, JobStatus::Done);
    assert_eq!(by_id["02-bad"].status, JobStatus::Failed);
    assert!(
        by_id["02-bad"]
            .error
            .as_deref()
            .unwrap()
            .contains("renderer crashed")
    );
    assert_eq!(by_id["04-outro"].status, JobStatus::Failed);
    assert!(
        by_id["04-outro"]
            .error
            .as_deref()
            .unwrap()
            .contains("skipped")
    );

    // The failed scenes never reached a sink `end`.
    let store = store.lock().unwrap();
    assert!(store.contains_key("01-hook"));
    assert!(store.contains_key("03-solution"));
    assert!(!store.contains_key("02-bad"));
    assert!(!store.contains_key("04-outro"));
}
