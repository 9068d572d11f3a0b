//! Benchmark Module for Classification Latency
//!
//! Measures end-to-end `classify` latency (decode, resize, forward pass,
//! argmax) on a fixed payload.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::service::PredictionService;
use crate::backend::backend_name;
use crate::config::ClassifierVariant;
use crate::utils::error::Result;

/// Configuration for benchmarking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Number of warmup iterations (excluded from measurements)
    pub warmup_iterations: usize,

    /// Number of benchmark iterations
    pub iterations: usize,

    /// Whether to keep individual iteration times
    pub verbose: bool,

    /// Output file for results (optional)
    pub output_path: Option<PathBuf>,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            warmup_iterations: 10,
            iterations: 100,
            verbose: false,
            output_path: None,
        }
    }
}

impl BenchmarkConfig {
    /// Create a quick benchmark config for testing
    pub fn quick() -> Self {
        Self {
            warmup_iterations: 2,
            iterations: 20,
            verbose: false,
            output_path: None,
        }
    }
}

/// Results from a benchmark run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResult {
    /// Latency statistics
    pub latency: LatencyStats,

    /// Throughput (images per second)
    pub throughput: f64,

    /// Individual iteration times (if verbose)
    pub iteration_times_ms: Vec<f64>,

    /// Configuration used for this benchmark
    pub config: BenchmarkConfig,

    /// Timestamp of when benchmark was run
    pub timestamp: String,

    /// Burn backend that ran the model
    pub backend: String,

    /// Classifier under test
    pub classifier: ClassifierVariant,
}

impl BenchmarkResult {
    /// Create a new benchmark result from timing data
    pub fn from_timings(
        timings: Vec<Duration>,
        config: BenchmarkConfig,
        classifier: ClassifierVariant,
    ) -> Self {
        let latency = LatencyStats::from_durations(&timings);
        let throughput = if latency.mean_ms > 0.0 {
            1000.0 / latency.mean_ms
        } else {
            0.0
        };

        let iteration_times_ms = if config.verbose {
            timings.iter().map(|d| d.as_secs_f64() * 1000.0).collect()
        } else {
            Vec::new()
        };

        Self {
            latency,
            throughput,
            iteration_times_ms,
            config,
            timestamp: chrono::Utc::now().to_rfc3339(),
            backend: backend_name().to_string(),
            classifier,
        }
    }

    /// Save results to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load results from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Get a summary string
    pub fn summary(&self) -> String {
        format!(
            "Latency: {:.2}ms (mean), {:.2}ms (p95), {:.2}ms (p99) | Throughput: {:.1} img/s",
            self.latency.mean_ms, self.latency.p95_ms, self.latency.p99_ms, self.throughput
        )
    }
}

impl std::fmt::Display for BenchmarkResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Benchmark Results")?;
        writeln!(f, "  Backend:     {}", self.backend)?;
        writeln!(f, "  Classifier:  {}", self.classifier)?;
        writeln!(f, "  Timestamp:   {}", self.timestamp)?;
        writeln!(f, "  Iterations:  {} (+{} warmup)", self.config.iterations, self.config.warmup_iterations)?;
        writeln!(f, "Latency")?;
        writeln!(f, "  Mean:    {:8.2} ms", self.latency.mean_ms)?;
        writeln!(f, "  Std Dev: {:8.2} ms", self.latency.std_ms)?;
        writeln!(f, "  Min:     {:8.2} ms", self.latency.min_ms)?;
        writeln!(f, "  Max:     {:8.2} ms", self.latency.max_ms)?;
        writeln!(f, "  P50:     {:8.2} ms", self.latency.p50_ms)?;
        writeln!(f, "  P95:     {:8.2} ms", self.latency.p95_ms)?;
        writeln!(f, "  P99:     {:8.2} ms", self.latency.p99_ms)?;
        writeln!(f, "Throughput: {:.1} images/second", self.throughput)
    }
}

/// Latency statistics from benchmark
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatencyStats {
    /// Mean latency in milliseconds
    pub mean_ms: f64,
    /// Standard deviation in milliseconds
    pub std_ms: f64,
    /// Minimum latency
    pub min_ms: f64,
    /// Maximum latency
    pub max_ms: f64,
    /// Median (50th percentile)
    pub p50_ms: f64,
    /// 95th percentile
    pub p95_ms: f64,
    /// 99th percentile
    pub p99_ms: f64,
}

impl LatencyStats {
    /// Calculate statistics from a list of durations
    pub fn from_durations(durations: &[Duration]) -> Self {
        if durations.is_empty() {
            return Self::default();
        }

        let mut times_ms: Vec<f64> = durations.iter().map(|d| d.as_secs_f64() * 1000.0).collect();
        times_ms.sort_by(|a, b| a.total_cmp(b));

        let n = times_ms.len();
        let mean = times_ms.iter().sum::<f64>() / n as f64;
        let variance: f64 = times_ms.iter().map(|t| (t - mean).powi(2)).sum::<f64>() / n as f64;

        Self {
            mean_ms: mean,
            std_ms: variance.sqrt(),
            min_ms: times_ms[0],
            max_ms: times_ms[n - 1],
            p50_ms: percentile(&times_ms, 50.0),
            p95_ms: percentile(&times_ms, 95.0),
            p99_ms: percentile(&times_ms, 99.0),
        }
    }
}

/// Calculate percentile from sorted data
fn percentile(sorted_data: &[f64], p: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let idx = (p / 100.0 * (sorted_data.len() - 1) as f64).round() as usize;
    sorted_data[idx.min(sorted_data.len() - 1)]
}

/// Timer utility for benchmarking
pub struct Timer {
    start: Instant,
    times: Vec<Duration>,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            times: Vec::new(),
        }
    }

    pub fn start(&mut self) {
        self.start = Instant::now();
    }

    /// Stop timing and record the duration
    pub fn stop(&mut self) -> Duration {
        let elapsed = self.start.elapsed();
        self.times.push(elapsed);
        elapsed
    }

    pub fn into_times(self) -> Vec<Duration> {
        self.times
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

/// Classify `payload` repeatedly and collect latency statistics
pub fn run_benchmark(
    service: &PredictionService,
    payload: &[u8],
    config: BenchmarkConfig,
) -> Result<BenchmarkResult> {
    let classifier = service.handle().variant();
    info!(
        iterations = config.iterations,
        warmup = config.warmup_iterations,
        %classifier,
        backend = backend_name(),
        "Starting benchmark"
    );

    for _ in 0..config.warmup_iterations {
        service.classify(payload)?;
    }

    let mut timer = Timer::new();
    for i in 0..config.iterations {
        timer.start();
        service.classify(payload)?;
        let elapsed = timer.stop();
        if config.verbose {
            debug!(iteration = i, elapsed_ms = elapsed.as_secs_f64() * 1000.0);
        }
    }

    let result = BenchmarkResult::from_timings(timer.into_times(), config, classifier);
    info!("{}", result.summary());

    if let Some(path) = &result.config.output_path {
        result.save(path)?;
        info!("Benchmark results saved to {:?}", path);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use crate::inference::preprocess::tests::white_gray_png;

    #[test]
    fn test_latency_stats() {
        let durations: Vec<Duration> = vec![
            Duration::from_millis(10),
            Duration::from_millis(12),
            Duration::from_millis(11),
            Duration::from_millis(15),
            Duration::from_millis(9),
        ];

        let stats = LatencyStats::from_durations(&durations);

        assert!((stats.mean_ms - 11.4).abs() < 0.1);
        assert_eq!(stats.min_ms, 9.0);
        assert_eq!(stats.max_ms, 15.0);
        assert_eq!(stats.p50_ms, 11.0);
    }

    #[test]
    fn test_empty_timings() {
        let stats = LatencyStats::from_durations(&[]);
        assert_eq!(stats.mean_ms, 0.0);
        let result = BenchmarkResult::from_timings(Vec::new(), BenchmarkConfig::quick(), ClassifierVariant::Mock);
        assert_eq!(result.throughput, 0.0);
    }

    #[test]
    fn test_timer() {
        let mut timer = Timer::new();

        for _ in 0..5 {
            timer.start();
            std::thread::sleep(Duration::from_millis(1));
            timer.stop();
        }

        let times = timer.into_times();
        assert_eq!(times.len(), 5);
        assert!(LatencyStats::from_durations(&times).mean_ms >= 1.0);
    }

    #[test]
    fn test_run_benchmark_with_mock_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out").join("bench.json");
        let service = PredictionService::from_config(&ServiceConfig::mock()).unwrap();

        let config = BenchmarkConfig {
            warmup_iterations: 1,
            iterations: 5,
            verbose: true,
            output_path: Some(output.clone()),
        };
        let result = run_benchmark(&service, &white_gray_png(64, 64), config).unwrap();

        assert_eq!(result.iteration_times_ms.len(), 5);
        assert_eq!(result.classifier, ClassifierVariant::Mock);

        let loaded = BenchmarkResult::load(&output).unwrap();
        assert_eq!(loaded.config.iterations, 5);
    }

    #[test]
    fn test_run_benchmark_propagates_invalid_payload() {
        let service = PredictionService::from_config(&ServiceConfig::mock()).unwrap();
        assert!(run_benchmark(&service, b"nope", BenchmarkConfig::quick()).is_err());
    }
}
