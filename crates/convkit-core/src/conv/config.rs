use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

use super::params::ConvGeometry;

/// Which kernel family computes a convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConvAlgorithm {
    /// Pick per call from the geometry.
    #[default]
    Auto,
    /// One independent sum per output (forward) or per gradient element
    /// (backward). No scratch memory.
    Direct,
    /// Unroll receptive fields into a column matrix and multiply (im2col + GEMM).
    Im2col,
}

impl ConvAlgorithm {
    /// Resolve `Auto` to a concrete algorithm for this geometry.
    ///
    /// A 1×1 kernel has nothing to unroll, so the column matrix would only
    /// be a copy of the input; everything else goes through im2col.
    pub fn resolve(self, geom: &ConvGeometry) -> ConvAlgorithm {
        match self {
            ConvAlgorithm::Auto if geom.kernel_plane() == 1 => ConvAlgorithm::Direct,
            ConvAlgorithm::Auto => ConvAlgorithm::Im2col,
            other => other,
        }
    }
}

impl fmt::Display for ConvAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConvAlgorithm::Auto => "auto",
            ConvAlgorithm::Direct => "direct",
            ConvAlgorithm::Im2col => "im2col",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ConvAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(ConvAlgorithm::Auto),
            "direct" => Ok(ConvAlgorithm::Direct),
            "im2col" | "gemm" => Ok(ConvAlgorithm::Im2col),
            other => Err(Error::msg(format!("unknown conv algorithm '{}'", other))),
        }
    }
}

/// Configuration for a [`Conv2dEngine`](super::Conv2dEngine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvConfig {
    /// Kernel family.
    pub algorithm: ConvAlgorithm,
    /// Whether to fan work out over rayon workers at all.
    pub parallel: bool,
    /// Problems with fewer multiply-accumulates than this run serially.
    pub min_parallel_work: usize,
    /// Size of a dedicated thread pool. `None` uses rayon's global pool.
    pub num_threads: Option<usize>,
}

impl Default for ConvConfig {
    fn default() -> Self {
        Self {
            algorithm: ConvAlgorithm::Auto,
            parallel: true,
            min_parallel_work: 1 << 15,
            num_threads: None,
        }
    }
}

impl ConvConfig {
    /// Environment variable selecting the algorithm (`auto`, `direct`, `im2col`).
    pub const ENV_ALGORITHM: &'static str = "CONVKIT_ALGORITHM";
    /// Environment variable sizing a dedicated thread pool.
    pub const ENV_NUM_THREADS: &'static str = "CONVKIT_NUM_THREADS";
    /// Environment variable forcing serial execution when set to `1` or `true`.
    pub const ENV_SERIAL: &'static str = "CONVKIT_SERIAL";

    pub fn algorithm(mut self, a: ConvAlgorithm) -> Self {
        self.algorithm = a;
        self
    }

    pub fn parallel(mut self, p: bool) -> Self {
        self.parallel = p;
        self
    }

    pub fn min_parallel_work(mut self, macs: usize) -> Self {
        self.min_parallel_work = macs;
        self
    }

    pub fn num_threads(mut self, n: usize) -> Self {
        self.num_threads = Some(n);
        self
    }

    /// Defaults overridden by `CONVKIT_*` environment variables.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = lookup(Self::ENV_ALGORITHM) {
            match v.parse() {
                Ok(a) => self.algorithm = a,
                Err(e) => log::warn!("ignoring {}: {}", Self::ENV_ALGORITHM, e),
            }
        }
        if let Some(v) = lookup(Self::ENV_NUM_THREADS) {
            match v.trim().parse::<usize>() {
                Ok(n) if n > 0 => self.num_threads = Some(n),
                _ => log::warn!("ignoring {}={:?}", Self::ENV_NUM_THREADS, v),
            }
        }
        if let Some(v) = lookup(Self::ENV_SERIAL) {
            if matches!(v.trim(), "1" | "true") {
                self.parallel = false;
            }
        }
        self
    }

    /// Whether a problem of this geometry should be fanned out.
    pub(crate) fn runs_parallel(&self, geom: &ConvGeometry) -> bool {
        self.parallel && geom.macs() >= self.min_parallel_work
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conv::ConvParams;
    use crate::shape::Shape;
    use std::collections::HashMap;

    fn geometry(k: usize) -> ConvGeometry {
        ConvGeometry::infer(
            &Shape::from((1, 2, 6, 6)),
            &Shape::from((3, 2, k, k)),
            ConvParams::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_auto_resolution() {
        assert_eq!(ConvAlgorithm::Auto.resolve(&geometry(1)), ConvAlgorithm::Direct);
        assert_eq!(ConvAlgorithm::Auto.resolve(&geometry(3)), ConvAlgorithm::Im2col);
        assert_eq!(ConvAlgorithm::Direct.resolve(&geometry(3)), ConvAlgorithm::Direct);
    }

    #[test]
    fn test_parse_algorithm() {
        assert_eq!("IM2COL".parse::<ConvAlgorithm>().unwrap(), ConvAlgorithm::Im2col);
        assert_eq!(" direct ".parse::<ConvAlgorithm>().unwrap(), ConvAlgorithm::Direct);
        assert!("winograd".parse::<ConvAlgorithm>().is_err());
    }

    #[test]
    fn test_builder() {
        let cfg = ConvConfig::default()
            .algorithm(ConvAlgorithm::Direct)
            .parallel(false)
            .num_threads(2);
        assert_eq!(cfg.algorithm, ConvAlgorithm::Direct);
        assert!(!cfg.parallel);
        assert_eq!(cfg.num_threads, Some(2));
        assert!(!cfg.runs_parallel(&geometry(3)));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("CONVKIT_ALGORITHM", "direct"),
            ("CONVKIT_NUM_THREADS", "0"),
            ("CONVKIT_SERIAL", "1"),
        ]
        .into_iter()
        .collect();
        let cfg = ConvConfig::default().with_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.algorithm, ConvAlgorithm::Direct);
        assert_eq!(cfg.num_threads, None);
        assert!(!cfg.parallel);
    }

    #[test]
    fn test_threshold() {
        let cfg = ConvConfig::default().min_parallel_work(0);
        assert!(cfg.runs_parallel(&geometry(3)));
        let cfg = ConvConfig::default().min_parallel_work(usize::MAX);
        assert!(!cfg.runs_parallel(&geometry(3)));
    }
}
