//! IR version reconciliation
//!
//! Merging requires both models to declare the same `ir_version`. The
//! preprocessing graph is generated at a fixed IR version while the base model
//! carries whatever its exporter wrote, so the base label is relabelled to
//! match. Only the label changes; the structural encoding of the base graph is
//! not translated.

use crate::proto::ModelProto;
use crate::{ComposerError, Result};
use serde::{Deserialize, Serialize};

/// First IR version with `opset_import`; relabelling across it is refused
pub const MIN_RELABEL_IR_VERSION: i64 = 3;

/// Default maximum distance between IR versions that may be relabelled
pub const DEFAULT_MAX_IR_GAP: u32 = 3;

/// How to handle differing IR versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionPolicy {
    /// Overwrite the base model's label with the preprocessing model's
    #[default]
    Relabel,
    /// Fail on any difference
    Strict,
}

impl std::str::FromStr for VersionPolicy {
    type Err = ComposerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "relabel" => Ok(VersionPolicy::Relabel),
            "strict" => Ok(VersionPolicy::Strict),
            other => Err(ComposerError::ConfigError(format!(
                "Unknown version policy '{}' (expected 'relabel' or 'strict')",
                other
            ))),
        }
    }
}

/// Record of what reconciliation did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionReconciliation {
    /// IR version of the preprocessing model (and of the result)
    pub preprocessing: i64,
    /// IR version the base model declared before reconciliation
    pub base_before: i64,
    /// Whether the base label was overwritten
    pub relabeled: bool,
}

/// Bring the base model's IR version label in line with the preprocessing model's
pub fn reconcile(
    preprocessing: &ModelProto,
    base: &mut ModelProto,
    policy: VersionPolicy,
    max_gap: u32,
) -> Result<VersionReconciliation> {
    let target = preprocessing.ir_version;
    let current = base.ir_version;

    if target == current {
        return Ok(VersionReconciliation {
            preprocessing: target,
            base_before: current,
            relabeled: false,
        });
    }

    if policy == VersionPolicy::Strict {
        return Err(ComposerError::VersionMismatch {
            preprocessing: target,
            base: current,
        });
    }

    if target < MIN_RELABEL_IR_VERSION || current < MIN_RELABEL_IR_VERSION {
        return Err(ComposerError::IncompatibleVersions(format!(
            "IR {} -> {} crosses IR {} (opset imports); re-export the base model instead",
            current, target, MIN_RELABEL_IR_VERSION
        )));
    }

    let gap = target.abs_diff(current);
    if gap > u64::from(max_gap) {
        return Err(ComposerError::IncompatibleVersions(format!(
            "IR {} -> {} is a gap of {} (max {})",
            current, target, gap, max_gap
        )));
    }

    tracing::warn!(
        "Relabelling base model IR version {} -> {}; graph encoding is not translated",
        current,
        target
    );
    base.ir_version = target;

    Ok(VersionReconciliation {
        preprocessing: target,
        base_before: current,
        relabeled: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(ir_version: i64) -> ModelProto {
        ModelProto {
            ir_version,
            ..Default::default()
        }
    }

    #[test]
    fn test_equal_versions_untouched() {
        let pre = model(8);
        let mut base = model(8);
        let rec = reconcile(&pre, &mut base, VersionPolicy::Strict, 0).unwrap();
        assert!(!rec.relabeled);
        assert_eq!(base.ir_version, 8);
    }

    #[test]
    fn test_relabel_overwrites_base() {
        let pre = model(8);
        let mut base = model(7);
        let rec = reconcile(&pre, &mut base, VersionPolicy::Relabel, DEFAULT_MAX_IR_GAP).unwrap();
        assert!(rec.relabeled);
        assert_eq!(rec.base_before, 7);
        assert_eq!(base.ir_version, 8);
    }

    #[test]
    fn test_relabel_downwards() {
        let pre = model(8);
        let mut base = model(9);
        reconcile(&pre, &mut base, VersionPolicy::Relabel, DEFAULT_MAX_IR_GAP).unwrap();
        assert_eq!(base.ir_version, 8);
    }

    #[test]
    fn test_strict_rejects_mismatch() {
        let pre = model(8);
        let mut base = model(7);
        let err = reconcile(&pre, &mut base, VersionPolicy::Strict, DEFAULT_MAX_IR_GAP).unwrap_err();
        assert!(matches!(
            err,
            ComposerError::VersionMismatch {
                preprocessing: 8,
                base: 7
            }
        ));
        assert_eq!(base.ir_version, 7);
    }

    #[test]
    fn test_gap_too_large() {
        let pre = model(10);
        let mut base = model(4);
        let err = reconcile(&pre, &mut base, VersionPolicy::Relabel, 3).unwrap_err();
        assert!(matches!(err, ComposerError::IncompatibleVersions(_)));
        assert_eq!(base.ir_version, 4);
    }

    #[test]
    fn test_pre_opset_era_refused() {
        let pre = model(4);
        let mut base = model(2);
        let err = reconcile(&pre, &mut base, VersionPolicy::Relabel, 10).unwrap_err();
        assert!(matches!(err, ComposerError::IncompatibleVersions(_)));
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("relabel".parse::<VersionPolicy>().unwrap(), VersionPolicy::Relabel);
        assert_eq!("STRICT".parse::<VersionPolicy>().unwrap(), VersionPolicy::Strict);
        assert!("upgrade".parse::<VersionPolicy>().is_err());
    }
}
