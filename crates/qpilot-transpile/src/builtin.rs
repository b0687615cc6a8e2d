//! Built-in converters between the IR and its textual dialects.

use qpilot_ir::Circuit;
use qpilot_qasm::{emit_qasm2, emit_qasm3, emit_quil, parse_qasm2, parse_qasm3};

use crate::data::CircuitData;
use crate::error::ConversionError;
use crate::formats::{IR, IR_JSON, QASM2, QASM3, QUIL};
use crate::registry::TranspilerRegistry;
use crate::transpiler::FnTranspiler;

type Convert = fn(CircuitData) -> Result<CircuitData, ConversionError>;

/// `(name, source, target, converter)`; all are safe and unit cost.
const BUILTINS: &[(&str, &str, &str, Convert)] = &[
    ("qasm2_to_ir", QASM2, IR, qasm2_to_ir),
    ("ir_to_qasm2", IR, QASM2, ir_to_qasm2),
    ("qasm3_to_ir", QASM3, IR, qasm3_to_ir),
    ("ir_to_qasm3", IR, QASM3, ir_to_qasm3),
    ("ir_json_to_ir", IR_JSON, IR, ir_json_to_ir),
    ("ir_to_ir_json", IR, IR_JSON, ir_to_ir_json),
    ("ir_to_quil", IR, QUIL, ir_to_quil),
];

pub(crate) fn register_builtins(registry: &mut TranspilerRegistry) {
    for (name, source, target, f) in BUILTINS {
        registry.insert(Box::new(FnTranspiler::new(*name, *source, *target, *f)));
    }
}

fn qasm2_to_ir(data: CircuitData) -> Result<CircuitData, ConversionError> {
    Ok(CircuitData::Ir(parse_qasm2(&data.into_text()?)?))
}

fn ir_to_qasm2(data: CircuitData) -> Result<CircuitData, ConversionError> {
    Ok(CircuitData::Text(emit_qasm2(&data.into_ir()?)?))
}

fn qasm3_to_ir(data: CircuitData) -> Result<CircuitData, ConversionError> {
    Ok(CircuitData::Ir(parse_qasm3(&data.into_text()?)?))
}

fn ir_to_qasm3(data: CircuitData) -> Result<CircuitData, ConversionError> {
    Ok(CircuitData::Text(emit_qasm3(&data.into_ir()?)?))
}

fn ir_json_to_ir(data: CircuitData) -> Result<CircuitData, ConversionError> {
    let value = match data {
        CircuitData::Json(v) => v,
        CircuitData::Text(s) => serde_json::from_str(&s)?,
        other => {
            return Err(ConversionError::UnexpectedInput {
                expected: "json",
                found: other.kind(),
            });
        }
    };
    Ok(CircuitData::Ir(Circuit::from_json(value)?))
}

fn ir_to_ir_json(data: CircuitData) -> Result<CircuitData, ConversionError> {
    Ok(CircuitData::Json(data.into_ir()?.to_json()?))
}

fn ir_to_quil(data: CircuitData) -> Result<CircuitData, ConversionError> {
    Ok(CircuitData::Text(emit_quil(&data.into_ir()?)?))
}
