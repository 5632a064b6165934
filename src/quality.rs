//! Threshold bucketing of raw connection metrics.
//!
//! Every function here is total: missing, non-finite or nonsensical input
//! falls into `Unknown` (signal) or `Poor` (latency, speed).

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Quality {
    Excellent,
    Good,
    Fair,
    Poor,
    Unknown,
}

impl Quality {
    pub fn label(&self) -> &'static str {
        match self {
            Quality::Excellent => "excellent",
            Quality::Good => "good",
            Quality::Fair => "fair",
            Quality::Poor => "poor",
            Quality::Unknown => "unknown",
        }
    }

    /// Fill level of the quality bar, in percent.
    pub fn score(&self) -> u8 {
        match self {
            Quality::Excellent => 100,
            Quality::Good => 75,
            Quality::Fair => 50,
            Quality::Poor => 25,
            Quality::Unknown => 0,
        }
    }
}

/// Signal strength in dBm; closer to zero is better.
pub fn signal_quality(dbm: Option<f64>) -> Quality {
    match dbm.filter(|v| v.is_finite()) {
        None => Quality::Unknown,
        Some(v) if v >= -50.0 => Quality::Excellent,
        Some(v) if v >= -60.0 => Quality::Good,
        Some(v) if v >= -70.0 => Quality::Fair,
        Some(_) => Quality::Poor,
    }
}

/// Round-trip latency in milliseconds; lower is better.
pub fn latency_quality(ms: Option<f64>) -> Quality {
    match ms.filter(|v| v.is_finite() && *v > 0.0) {
        Some(v) if v < 50.0 => Quality::Excellent,
        Some(v) if v < 100.0 => Quality::Good,
        Some(v) if v < 150.0 => Quality::Fair,
        _ => Quality::Poor,
    }
}

/// Throughput in Mbps; higher is better.
pub fn speed_quality(mbps: Option<f64>) -> Quality {
    match mbps.filter(|v| v.is_finite() && *v > 0.0) {
        Some(v) if v >= 100.0 => Quality::Excellent,
        Some(v) if v >= 50.0 => Quality::Good,
        Some(v) if v >= 25.0 => Quality::Fair,
        _ => Quality::Poor,
    }
}

/// Parses the leading number of values like `"-45 dBm"` or `"12.5"`.
pub fn parse_metric(raw: &str) -> Option<f64> {
    let raw = raw.trim_start();
    let end = raw
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || c == '.' || (i == 0 && (c == '-' || c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(raw.len());
    raw[..end].parse::<f64>().ok().filter(|v| v.is_finite())
}
