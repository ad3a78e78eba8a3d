// ⏳ Aging Buckets - days overdue → current / 30 / 60 / 90 / +90
// Ranges are upper-inclusive: 30 days is still the 30 bucket, 31 starts the 60 bucket.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgingBucket {
    /// Not yet due (0 or negative days)
    Current,
    Days30,
    Days60,
    Days90,
    Over90,
}

impl AgingBucket {
    pub const ALL: [AgingBucket; 5] = [
        AgingBucket::Current,
        AgingBucket::Days30,
        AgingBucket::Days60,
        AgingBucket::Days90,
        AgingBucket::Over90,
    ];

    /// Classify a days-overdue value. Fractional days round up (0.5 days late is late).
    pub fn classify(days: f64) -> AgingBucket {
        let days = days.ceil();
        if days <= 0.0 {
            AgingBucket::Current
        } else if days <= 30.0 {
            AgingBucket::Days30
        } else if days <= 60.0 {
            AgingBucket::Days60
        } else if days <= 90.0 {
            AgingBucket::Days90
        } else {
            AgingBucket::Over90
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AgingBucket::Current => "Por vencer",
            AgingBucket::Days30 => "1-30 días",
            AgingBucket::Days60 => "31-60 días",
            AgingBucket::Days90 => "61-90 días",
            AgingBucket::Over90 => "Más de 90 días",
        }
    }

    /// Money column holding this bucket in recaudo exports
    pub fn recaudo_column(&self) -> &'static str {
        match self {
            AgingBucket::Current => "POR_VENCER",
            AgingBucket::Days30 => "TREINTA_DIAS",
            AgingBucket::Days60 => "SESENTA_DIAS",
            AgingBucket::Days90 => "NOVENTA_DIAS",
            AgingBucket::Over90 => "MAS_NOVENTA",
        }
    }

    /// Money column holding this bucket in cartera exports
    pub fn cartera_column(&self) -> &'static str {
        match self {
            AgingBucket::Current => "Por Vencer",
            AgingBucket::Days30 => "Dias30",
            AgingBucket::Days60 => "Dias60",
            AgingBucket::Days90 => "Dias90",
            AgingBucket::Over90 => "Dias Mas90",
        }
    }
}

/// Record counts per bucket; NaN or missing days count as unclassified
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketCounts {
    pub counts: BTreeMap<AgingBucket, usize>,
    pub unclassified: usize,
}

impl BucketCounts {
    pub fn from_days(days: &[Option<f64>]) -> Self {
        let mut out = BucketCounts::default();
        for bucket in AgingBucket::ALL {
            out.counts.insert(bucket, 0);
        }
        for d in days {
            match d {
                Some(v) if v.is_finite() => {
                    *out.counts.entry(AgingBucket::classify(*v)).or_insert(0) += 1;
                }
                _ => out.unclassified += 1,
            }
        }
        out
    }

    pub fn get(&self, bucket: AgingBucket) -> usize {
        self.counts.get(&bucket).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum::<usize>() + self.unclassified
    }
}
