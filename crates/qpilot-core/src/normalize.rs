//! Provider-native measurement data → canonical results.
//!
//! Backends report outcomes keyed either by bit strings (`"011"`,
//! `"01 10"`) or by hex (`"0x3"`). Canonical keys are hex, one word per
//! classical register, registers separated by a single space in the order
//! the backend reported them.

use std::collections::BTreeMap;

use qpilot_ir::Circuit;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{CoreError, CoreResult};
use crate::model::{JobId, ProgramId};
use crate::result::{JobResult, ResultType};

/// Name and width of one classical register, recorded in result metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterLayout {
    pub name: String,
    pub size: u32,
}

/// Register layout of a circuit's classical registers.
pub fn registers_of(circuit: &Circuit) -> Vec<RegisterLayout> {
    circuit
        .cregs()
        .iter()
        .map(|r| RegisterLayout {
            name: r.name.clone(),
            size: r.size,
        })
        .collect()
}

/// Convert one measurement key to canonical hex.
pub fn normalize_key(key: &str) -> CoreResult<String> {
    let words: Vec<&str> = key.split_whitespace().collect();
    if words.is_empty() {
        return Err(CoreError::InvalidMeasurementKey(key.to_string()));
    }
    let mut out = Vec::with_capacity(words.len());
    for word in words {
        let parsed = if let Some(hex) = word.strip_prefix("0x") {
            u128::from_str_radix(hex, 16).ok()
        } else {
            let bits = word.strip_prefix("0b").unwrap_or(word);
            if !bits.is_empty() && bits.bytes().all(|b| b == b'0' || b == b'1') {
                u128::from_str_radix(bits, 2).ok()
            } else {
                None
            }
        };
        let value = parsed.ok_or_else(|| CoreError::InvalidMeasurementKey(key.to_string()))?;
        out.push(format!("0x{value:x}"));
    }
    Ok(out.join(" "))
}

fn meta(registers: &[RegisterLayout], shots: Option<u64>) -> Value {
    let mut meta = json!({ "format": "hex", "registers": registers });
    if let Some(shots) = shots {
        meta["shots"] = json!(shots);
    }
    meta
}

/// A COUNTS result with probabilities derived from the counts.
///
/// Raw keys that normalize to the same hex key are merged.
pub fn counts_result(
    job_id: JobId,
    program_id: Option<ProgramId>,
    counts: impl IntoIterator<Item = (String, u64)>,
    registers: &[RegisterLayout],
) -> CoreResult<JobResult> {
    let mut merged: BTreeMap<String, u64> = BTreeMap::new();
    for (key, n) in counts {
        *merged.entry(normalize_key(&key)?).or_default() += n;
    }
    let shots: u64 = merged.values().sum();
    let probabilities: BTreeMap<&str, f64> = merged
        .iter()
        .map(|(k, n)| {
            let p = if shots == 0 { 0.0 } else { *n as f64 / shots as f64 };
            (k.as_str(), p)
        })
        .collect();
    Ok(JobResult::new(
        job_id,
        program_id,
        ResultType::Counts,
        json!({ "counts": merged, "probabilities": probabilities }),
        meta(registers, Some(shots)),
    ))
}

fn distribution(
    values: impl IntoIterator<Item = (String, f64)>,
) -> CoreResult<BTreeMap<String, f64>> {
    let mut merged = BTreeMap::new();
    for (key, p) in values {
        *merged.entry(normalize_key(&key)?).or_insert(0.0) += p;
    }
    Ok(merged)
}

/// A PROBABILITIES result.
pub fn probabilities_result(
    job_id: JobId,
    program_id: Option<ProgramId>,
    probabilities: impl IntoIterator<Item = (String, f64)>,
    registers: &[RegisterLayout],
) -> CoreResult<JobResult> {
    Ok(JobResult::new(
        job_id,
        program_id,
        ResultType::Probabilities,
        json!({ "probabilities": distribution(probabilities)? }),
        meta(registers, None),
    ))
}

/// A QUASI_DIST result.
pub fn quasi_dist_result(
    job_id: JobId,
    program_id: Option<ProgramId>,
    quasi_dist: impl IntoIterator<Item = (String, f64)>,
    registers: &[RegisterLayout],
    shots: u64,
) -> CoreResult<JobResult> {
    Ok(JobResult::new(
        job_id,
        program_id,
        ResultType::QuasiDist,
        json!({ "quasi_dist": distribution(quasi_dist)? }),
        meta(registers, Some(shots)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_and_hex_keys() {
        assert_eq!(normalize_key("011").unwrap(), "0x3");
        assert_eq!(normalize_key("0x3").unwrap(), "0x3");
        assert_eq!(normalize_key("0b101").unwrap(), "0x5");
        assert_eq!(normalize_key("01 10").unwrap(), "0x1 0x2");
        assert_eq!(normalize_key("0xff 0").unwrap(), "0xff 0x0");
        assert_eq!(normalize_key("0xA").unwrap(), "0xa");
    }

    #[test]
    fn test_invalid_keys() {
        for key in ["", "  ", "012", "0xzz", "abc"] {
            assert!(
                matches!(normalize_key(key), Err(CoreError::InvalidMeasurementKey(_))),
                "{key:?} accepted"
            );
        }
    }

    #[test]
    fn test_counts_merge_and_probabilities() {
        let regs = vec![RegisterLayout {
            name: "c".into(),
            size: 2,
        }];
        let r = counts_result(
            JobId::new(),
            None,
            [("00".to_string(), 30), ("0x0".to_string(), 10), ("11".to_string(), 60)],
            &regs,
        )
        .unwrap();
        assert_eq!(r.result_type, ResultType::Counts);
        assert_eq!(r.data["counts"]["0x0"], 40);
        assert_eq!(r.data["counts"]["0x3"], 60);
        assert_eq!(r.data["probabilities"]["0x3"], 0.6);
        assert_eq!(r.meta["shots"], 100);
        assert_eq!(r.meta["format"], "hex");
        assert_eq!(r.meta["registers"][0]["name"], "c");
    }

    #[test]
    fn test_registers_of_circuit() {
        let c = Circuit::bell().unwrap();
        assert_eq!(
            registers_of(&c),
            vec![RegisterLayout {
                name: "c".into(),
                size: 2
            }]
        );
    }
}
