//! 消息分发指标收集模块
//!
//! 通过 `metrics` facade 记录 Prometheus 指标，并提供进程内批次统计。

use metrics::{counter, gauge, histogram};

/// 记录消息入队
pub fn record_message_pushed(dispatcher: &str) {
    counter!(
        "msgbus_messages_pushed_total",
        "dispatcher" => dispatcher.to_string()
    )
    .increment(1);
}

/// 记录一次成功的 handler 调用
pub fn record_message_delivered(dispatcher: &str) {
    counter!(
        "msgbus_messages_delivered_total",
        "dispatcher" => dispatcher.to_string()
    )
    .increment(1);
}

/// 记录无 handler 的消息 (静默丢弃)
pub fn record_message_dropped(dispatcher: &str) {
    counter!(
        "msgbus_messages_dropped_total",
        "dispatcher" => dispatcher.to_string()
    )
    .increment(1);
}

/// 记录 handler 失败 (`kind` = "error" | "panic")
pub fn record_handler_failure(dispatcher: &str, kind: &str) {
    counter!(
        "msgbus_handler_failures_total",
        "dispatcher" => dispatcher.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// 记录一次 drain 的批次大小
pub fn record_batch_size(dispatcher: &str, size: usize) {
    counter!(
        "msgbus_batches_total",
        "dispatcher" => dispatcher.to_string()
    )
    .increment(1);
    histogram!(
        "msgbus_batch_size",
        "dispatcher" => dispatcher.to_string()
    )
    .record(size as f64);
}

/// 记录队列深度
pub fn record_queue_depth(dispatcher: &str, depth: usize) {
    gauge!(
        "msgbus_queue_depth",
        "dispatcher" => dispatcher.to_string()
    )
    .set(depth as f64);
}

/// 批次统计聚合器
///
/// 在内存中聚合批次与延迟，便于运行结束时输出摘要。
#[derive(Debug, Clone, Default)]
pub struct BatchStatsAggregator {
    /// 批次大小统计
    pub batch_sizes: RunningStats,

    /// 入队到投递的延迟统计 (毫秒)
    pub latency_ms: RunningStats,
}

impl BatchStatsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录批次大小
    pub fn record_batch(&mut self, size: usize) {
        self.batch_sizes.push(size as f64);
    }

    /// 记录单条消息延迟
    pub fn record_latency_ms(&mut self, latency_ms: f64) {
        self.latency_ms.push(latency_ms);
    }

    /// 合并另一个聚合器
    pub fn merge(&mut self, other: &BatchStatsAggregator) {
        self.batch_sizes.merge(&other.batch_sizes);
        self.latency_ms.merge(&other.latency_ms);
    }

    /// 生成摘要
    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            batch_size: StatsSummary::from(&self.batch_sizes),
            latency_ms: StatsSummary::from(&self.latency_ms),
        }
    }
}

/// 批次摘要
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub batch_size: StatsSummary,
    pub latency_ms: StatsSummary,
}

impl std::fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Batch size: {}", self.batch_size)?;
        write!(f, "Latency (ms): {}", self.latency_ms)
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// 合并两组统计 (Chan 并行算法)
    pub fn merge(&mut self, other: &RunningStats) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = other.clone();
            return;
        }

        let count = self.count + other.count;
        let delta = other.mean - self.mean;
        self.m2 += other.m2 + delta * delta * (self.count as f64 * other.count as f64) / count as f64;
        self.mean += delta * other.count as f64 / count as f64;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.count = count;
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// 标准差
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
