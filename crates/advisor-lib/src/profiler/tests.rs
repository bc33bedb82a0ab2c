//! Session tests for the sampler and aggregator
//!
//! Time is virtual: every test runs on tokio's paused clock, so intervals,
//! backoffs and deadlines elapse instantly and deterministically.

#[cfg(test)]
mod session_tests {
    use crate::config::{AggregatorConfig, SamplerConfig};
    use crate::error::SampleError;
    use crate::models::{Metric, ProcessorStats, SessionStatus, Tier};
    use crate::profiler::{
        AggregateOutcome, MetricsSampler, ProfileSession, SamplerBuilder, StatsSource,
    };
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::Instant;
    use tokio_test::assert_ok;
    use tokio_util::sync::CancellationToken;

    /// Source that plays a script of results, then returns healthy stats
    struct ScriptedSource {
        script: Mutex<VecDeque<Result<(), SampleError>>>,
        delay: Duration,
        calls: AtomicU64,
    }

    impl ScriptedSource {
        fn healthy() -> Self {
            Self::with_script(vec![])
        }

        fn with_script(script: Vec<Result<(), SampleError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                delay: Duration::ZERO,
                calls: AtomicU64::new(0),
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::healthy()
            }
        }

        fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StatsSource for ScriptedSource {
        async fn get_stats(&self, _processor: &str) -> Result<ProcessorStats, SampleError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let scripted = self.script.lock().unwrap().pop_front();
            if let Some(Err(e)) = scripted {
                return Err(e);
            }
            Ok(ProcessorStats {
                input_message_count: 1000 + call * 100,
                output_message_count: 900 + call * 100,
                memory_usage_bytes: 64 * 1024 * 1024,
                cpu_utilization: Some(50.0),
                lag: Some(10.0),
                tier: Some(Tier::T1),
                ..ProcessorStats::default()
            })
        }
    }

    fn unavailable() -> Result<(), SampleError> {
        Err(SampleError::Status {
            status: 503,
            body: "unavailable".into(),
        })
    }

    fn config(interval_secs: u64, duration_secs: Option<u64>) -> SamplerConfig {
        SamplerConfig {
            interval_ms: interval_secs * 1000,
            duration_ms: duration_secs.map(|d| d * 1000),
            ..SamplerConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_session_completes_at_deadline() {
        let source = Arc::new(ScriptedSource::healthy());
        let (sampler, mut rx) = MetricsSampler::new(source.clone(), "orders", config(10, Some(60)));

        let started = Instant::now();
        let report = sampler.run(CancellationToken::new()).await;

        assert_eq!(report.status, SessionStatus::Completed);
        assert_eq!(report.polls, 6);
        assert_eq!(report.snapshots, 6);
        assert_eq!(report.gaps, 0);
        assert!(started.elapsed() <= Duration::from_secs(60));
        assert_eq!(report.current_tier, Some(Tier::T1));

        let mut sequences = Vec::new();
        while let Some(snapshot) = rx.recv().await {
            sequences.push(snapshot.sequence);
        }
        assert_eq!(sequences, vec![0, 1, 2, 3, 4, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flaky_source_retries_then_gaps() {
        // poll 1: two failures then success; poll 2: four failures -> gap
        let source = Arc::new(ScriptedSource::with_script(vec![
            unavailable(),
            unavailable(),
            Ok(()),
            unavailable(),
            unavailable(),
            unavailable(),
            unavailable(),
        ]));
        let (sampler, _rx) = MetricsSampler::new(source.clone(), "orders", config(10, Some(30)));
        let report = sampler.run(CancellationToken::new()).await;

        assert_eq!(report.status, SessionStatus::Completed);
        assert_eq!(report.polls, 3);
        assert_eq!(report.snapshots, 2);
        assert_eq!(report.gaps, 1);
        assert_eq!(report.retries, 5);
        assert_eq!(source.calls(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_is_not_retried() {
        let source = Arc::new(ScriptedSource::with_script(vec![Err(SampleError::NotFound(
            "orders".into(),
        ))]));
        let (sampler, _rx) = MetricsSampler::new(source.clone(), "orders", config(10, Some(20)));
        let report = sampler.run(CancellationToken::new()).await;

        assert_eq!(report.retries, 0);
        assert_eq!(report.gaps, 1);
        assert_eq!(report.snapshots, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_observed_within_one_interval() {
        let source = Arc::new(ScriptedSource::healthy());
        let (sampler, _rx) = MetricsSampler::new(source, "orders", config(10, None));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(25)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let report = sampler.run(cancel).await;

        assert_eq!(report.status, SessionStatus::Cancelled);
        assert_eq!(report.polls, 3);
        assert!(started.elapsed() < Duration::from_secs(35));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_retry_backoff() {
        let source = Arc::new(ScriptedSource::with_script(vec![unavailable(); 10]));
        let sampler_config = SamplerConfig {
            retry_backoff_ms: 30_000,
            max_backoff_ms: 60_000,
            ..config(10, None)
        };
        let (sampler, _rx) = MetricsSampler::new(source.clone(), "orders", sampler_config);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let report = sampler.run(cancel).await;

        assert_eq!(report.status, SessionStatus::Cancelled);
        assert_eq!(report.gaps, 1);
        assert_eq!(source.calls(), 1);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_polls_never_overrun_deadline() {
        let source = Arc::new(ScriptedSource::slow(Duration::from_secs(4)));
        let (sampler, _rx) = MetricsSampler::new(source.clone(), "orders", config(5, Some(12)));

        let started = Instant::now();
        let report = sampler.run(CancellationToken::new()).await;

        assert_eq!(report.status, SessionStatus::Completed);
        // polls at 0s and 5s; a poll at 10s would finish at 14s
        assert_eq!(report.polls, 2);
        assert_eq!(report.snapshots, 2);
        assert!(started.elapsed() <= Duration::from_secs(12));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_source_times_out_into_gap() {
        let source = Arc::new(ScriptedSource::slow(Duration::from_secs(3600)));
        let sampler_config = SamplerConfig {
            poll_timeout_ms: 1_000,
            max_retries: 1,
            ..config(10, Some(5))
        };
        let (sampler, _rx) = MetricsSampler::new(source.clone(), "orders", sampler_config);

        let started = Instant::now();
        let report = sampler.run(CancellationToken::new()).await;

        assert_eq!(report.polls, 1);
        assert_eq!(report.retries, 1);
        assert_eq!(report.gaps, 1);
        assert_eq!(report.snapshots, 0);
        assert!(started.elapsed() <= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_receiver_stops_sampler() {
        let source = Arc::new(ScriptedSource::healthy());
        let (sampler, rx) = MetricsSampler::new(source, "orders", config(10, None));
        drop(rx);

        let report = sampler.run(CancellationToken::new()).await;
        assert_eq!(report.status, SessionStatus::Cancelled);
        assert_eq!(report.snapshots, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_summarizes_snapshots() {
        let source = Arc::new(ScriptedSource::healthy());
        let session = ProfileSession::new(
            source,
            "orders",
            config(10, Some(60)),
            AggregatorConfig::default(),
        );
        let (outcome, report) = session.run(CancellationToken::new()).await;

        assert_eq!(report.snapshots, 6);
        let summary = outcome.summary().unwrap();
        assert_eq!(summary.sample_count, 6);
        assert_eq!(summary.status, SessionStatus::Completed);
        assert_eq!(summary.current_tier, Some(Tier::T1));
        assert_eq!(summary.span_secs, 50.0);

        // 100 messages every 10s
        let input = summary.metric(Metric::InputRate).unwrap();
        assert_eq!(input.count, 5);
        assert!((input.mean - 10.0).abs() < 1e-9);
        assert_eq!(summary.metric(Metric::CpuUtilization).unwrap().p95, 50.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_without_snapshots_is_empty() {
        let source = Arc::new(ScriptedSource::with_script(vec![Err(SampleError::NotFound(
            "orders".into(),
        ))]));
        let session = ProfileSession::new(
            source,
            "orders",
            config(10, Some(5)),
            AggregatorConfig::default(),
        );
        let (outcome, report) = session.run(CancellationToken::new()).await;

        assert_eq!(report.gaps, 1);
        assert_eq!(outcome.status(), SessionStatus::Empty);
        assert!(matches!(outcome, AggregateOutcome::Empty { gap_count: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_sessions_are_independent() {
        let healthy = Arc::new(ScriptedSource::healthy());
        let broken = Arc::new(ScriptedSource::with_script(vec![
            Err(SampleError::NotFound("b".into())),
            Err(SampleError::NotFound("b".into())),
            Err(SampleError::NotFound("b".into())),
        ]));

        let a = ProfileSession::new(healthy, "a", config(10, Some(30)), AggregatorConfig::default());
        let b = ProfileSession::new(broken, "b", config(10, Some(30)), AggregatorConfig::default());
        let cancel = CancellationToken::new();

        let ((outcome_a, _), (outcome_b, _)) = tokio::join!(a.run(cancel.clone()), b.run(cancel));

        assert_eq!(outcome_a.summary().unwrap().sample_count, 3);
        assert_eq!(outcome_b.status(), SessionStatus::Empty);
    }

    #[tokio::test]
    async fn test_builder_builds_sampler() {
        let result = SamplerBuilder::new()
            .source(Arc::new(ScriptedSource::healthy()))
            .processor("orders")
            .interval(Duration::from_secs(5))
            .continuous()
            .max_retries(1)
            .build();
        assert_ok!(result);

        let missing = SamplerBuilder::new().source(Arc::new(ScriptedSource::healthy())).build();
        assert!(missing.is_err());
    }
}
