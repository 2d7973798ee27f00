use std::path::PathBuf;
use std::time::Instant;

use tracing::{debug, warn};

use crate::capture::pipeline::{CaptureOpts, record_scene};
use crate::capture::progress::ProgressObserver;
use crate::driver::RendererDriver;
use crate::encode::sink::FrameSink;
use crate::foundation::error::{ReclockError, ReclockResult};
use crate::scenes::{JobStatus, SceneJob};

/// Builds one isolated rendering session per worker. Invoked on the worker's
/// own thread with its worker id.
pub type DriverFactory<'a> = &'a (dyn Fn(usize) -> ReclockResult<Box<dyn RendererDriver>> + Sync);

/// Builds the encoder sink and artifact path for one job.
pub type SinkFactory<'a> =
    &'a (dyn Fn(&SceneJob) -> ReclockResult<(Box<dyn FrameSink>, PathBuf)> + Sync);

/// The jobs assigned to one worker, in original relative order.
#[derive(Debug)]
pub struct WorkerAssignment {
    pub worker_id: usize,
    pub jobs: Vec<SceneJob>,
}

/// Clamp the worker count to the number of jobs: requesting 10 workers for 3
/// jobs yields exactly 3.
pub fn clamp_worker_count(requested: usize, job_count: usize) -> usize {
    requested.max(1).min(job_count)
}

/// Round-robin partition: job `i` goes to worker `i % worker_count`, which
/// preserves each worker's jobs in original relative order.
pub fn partition_round_robin(jobs: Vec<SceneJob>, parallelism: usize) -> Vec<WorkerAssignment> {
    let worker_count = clamp_worker_count(parallelism, jobs.len());
    let mut assignments: Vec<WorkerAssignment> = (0..worker_count)
        .map(|worker_id| WorkerAssignment {
            worker_id,
            jobs: Vec::new(),
        })
        .collect();
    for (i, job) in jobs.into_iter().enumerate() {
        assignments[i % worker_count].jobs.push(job);
    }
    assignments
}

/// Final state of one scene job after a run.
#[derive(Clone, Debug, serde::Serialize)]
pub struct JobReport {
    pub scene_id: String,
    pub status: JobStatus,
    pub artifact: Option<PathBuf>,
    pub duration_seconds: f64,
    pub wall_seconds: f64,
    pub error: Option<String>,
}

/// Aggregated outcome of a run. Reports are sorted by scene id, so output is
/// deterministic regardless of completion order across workers.
#[derive(Debug, serde::Serialize)]
pub struct RunReport {
    pub reports: Vec<JobReport>,
    pub worker_count: usize,
    /// Summed duration of successfully recorded video.
    pub total_video_seconds: f64,
    /// Max across workers when parallel (the critical path), sum of per-job
    /// wall times when sequential.
    pub wall_seconds: f64,
}

impl RunReport {
    pub fn failed_count(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| r.status == JobStatus::Failed)
            .count()
    }
}

struct WorkerOutput {
    reports: Vec<JobReport>,
    wall_seconds: f64,
}

/// Run all jobs across `parallelism` isolated rendering sessions.
///
/// Workers share nothing beyond the read-only partition made here; each
/// processes its jobs strictly sequentially. A job failure fails that job and
/// aborts the rest of its worker's queue, while sibling workers finish; the
/// run itself still returns `Ok` with the partial failure in the report. Only
/// a panicking worker aborts the whole run.
pub fn run_jobs(
    jobs: Vec<SceneJob>,
    opts: &CaptureOpts,
    parallelism: usize,
    make_driver: DriverFactory<'_>,
    make_sink: SinkFactory<'_>,
    progress: &dyn ProgressObserver,
) -> ReclockResult<RunReport> {
    if jobs.is_empty() {
        return Err(ReclockError::validation("no scene jobs to run"));
    }

    let assignments = partition_round_robin(jobs, parallelism);
    let worker_count = assignments.len();
    debug!(worker_count, "starting recording run");

    let outputs: Vec<ReclockResult<WorkerOutput>> = std::thread::scope(|scope| {
        let handles: Vec<_> = assignments
            .into_iter()
            .map(|assignment| {
                scope.spawn(move || run_worker(assignment, opts, make_driver, make_sink, progress))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| {
                h.join()
                    .map_err(|_| ReclockError::driver("worker thread panicked"))
            })
            .collect()
    });

    let mut reports = Vec::new();
    let mut max_worker_wall = 0.0f64;
    for out in outputs {
        let out = out?;
        max_worker_wall = max_worker_wall.max(out.wall_seconds);
        reports.extend(out.reports);
    }
    reports.sort_by(|a, b| a.scene_id.cmp(&b.scene_id));

    let total_video_seconds = reports
        .iter()
        .filter(|r| r.status == JobStatus::Done)
        .map(|r| r.duration_seconds)
        .sum();
    let wall_seconds = if worker_count > 1 {
        max_worker_wall
    } else {
        reports.iter().map(|r| r.wall_seconds).sum()
    };

    Ok(RunReport {
        reports,
        worker_count,
        total_video_seconds,
        wall_seconds,
    })
}

fn run_worker(
    assignment: WorkerAssignment,
    opts: &CaptureOpts,
    make_driver: DriverFactory<'_>,
    make_sink: SinkFactory<'_>,
    progress: &dyn ProgressObserver,
) -> WorkerOutput {
    let start = Instant::now();
    let mut reports = Vec::with_capacity(assignment.jobs.len());

    let mut driver = match make_driver(assignment.worker_id) {
        Ok(driver) => driver,
        Err(err) => {
            warn!(worker = assignment.worker_id, error = %err, "worker failed to start");
            let msg = format!("worker failed to start: {err}");
            for job in &assignment.jobs {
                reports.push(failed_report(job, 0.0, msg.clone()));
            }
            return WorkerOutput {
                reports,
                wall_seconds: start.elapsed().as_secs_f64(),
            };
        }
    };

    let mut aborted: Option<String> = None;
    for mut job in assignment.jobs {
        if let Some(reason) = &aborted {
            reports.push(failed_report(
                &job,
                0.0,
                format!("skipped: worker aborted after earlier failure: {reason}"),
            ));
            continue;
        }

        job.status = JobStatus::Running;
        let job_start = Instant::now();
        let outcome = make_sink(&job).and_then(|(mut sink, artifact)| {
            record_scene(
                driver.as_mut(),
                &job,
                sink.as_mut(),
                &artifact,
                opts,
                progress,
            )
        });

        match outcome {
            Ok(result) => reports.push(JobReport {
                scene_id: result.scene_id.clone(),
                status: JobStatus::Done,
                artifact: Some(result.artifact),
                duration_seconds: result.duration_seconds,
                wall_seconds: result.wall_seconds,
                error: None,
            }),
            Err(err) => {
                warn!(scene = %job.id, error = %err, "scene job failed; aborting this worker's queue");
                let msg = err.to_string();
                reports.push(failed_report(&job, job_start.elapsed().as_secs_f64(), msg.clone()));
                aborted = Some(msg);
            }
        }
    }

    WorkerOutput {
        reports,
        wall_seconds: start.elapsed().as_secs_f64(),
    }
}

fn failed_report(job: &SceneJob, wall_seconds: f64, error: String) -> JobReport {
    JobReport {
        scene_id: job.id.clone(),
        status: JobStatus::Failed,
        artifact: None,
        duration_seconds: job.duration_seconds,
        wall_seconds,
        error: Some(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::core::Fps;

    fn jobs(n: usize) -> Vec<SceneJob> {
        let fps = Fps::new(60, 1).unwrap();
        (0..n)
            .map(|i| {
                SceneJob::new(
                    format!("{:02}-scene", i + 1),
                    format!("scenes/{:02}-scene.html", i + 1),
                    2.0,
                    fps,
                    0.5,
                )
            })
            .collect()
    }

    #[test]
    fn worker_count_is_clamped_to_job_count() {
        assert_eq!(clamp_worker_count(10, 3), 3);
        assert_eq!(clamp_worker_count(2, 3), 2);
        assert_eq!(clamp_worker_count(0, 3), 1);
        assert_eq!(partition_round_robin(jobs(3), 10).len(), 3);
    }

    #[test]
    fn round_robin_preserves_relative_order() {
        let parts = partition_round_robin(jobs(5), 2);
        assert_eq!(parts.len(), 2);
        fn ids(w: &WorkerAssignment) -> Vec<&str> {
            w.jobs.iter().map(|j| j.id.as_str()).collect()
        }
        assert_eq!(ids(&parts[0]), vec!["01-scene", "03-scene", "05-scene"]);
        assert_eq!(ids(&parts[1]), vec!["02-scene", "04-scene"]);
    }

    #[test]
    fn empty_job_list_is_rejected() {
        let opts = CaptureOpts::default();
        let res = run_jobs(
            Vec::new(),
            &opts,
            1,
            &|_| Err(ReclockError::driver("unused")),
            &|_| Err(ReclockError::driver("unused")),
            &crate::capture::progress::NoopProgress,
        );
        assert!(res.is_err());
    }
}
