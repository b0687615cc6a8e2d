//! Recursive-descent parser lowering `OpenQASM` 2 and 3 source directly to IR.
//!
//! The accepted subset is the flat-circuit core shared by both dialects:
//! register declarations in either style (`qreg q[2];` / `qubit[2] q;`),
//! standard gate calls with constant parameter expressions, register
//! broadcasting, measurement in either style (`measure q -> c;` /
//! `c = measure q;`), `reset` and `barrier`. Gate definitions and classical
//! control flow are rejected with [`ParseError::Unsupported`].

use qpilot_ir::{Circuit, ClbitId, Gate, Instruction, QubitId};

use crate::error::{ParseError, ParseResult};
use crate::lexer::{SpannedToken, Token, tokenize};

/// `OpenQASM` language revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `OPENQASM 2.0`
    Qasm2,
    /// `OPENQASM 3` / `3.0`
    Qasm3,
}

impl Dialect {
    fn major(self) -> u8 {
        match self {
            Dialect::Qasm2 => 2,
            Dialect::Qasm3 => 3,
        }
    }
}

/// Parse source of either dialect, detected from the version header.
pub fn parse(source: &str) -> ParseResult<Circuit> {
    parse_with(source, None)
}

/// Parse source that must declare `OPENQASM 2.x`.
pub fn parse_qasm2(source: &str) -> ParseResult<Circuit> {
    parse_with(source, Some(Dialect::Qasm2))
}

/// Parse source that must declare `OPENQASM 3.x`.
pub fn parse_qasm3(source: &str) -> ParseResult<Circuit> {
    parse_with(source, Some(Dialect::Qasm3))
}

fn parse_with(source: &str, expected: Option<Dialect>) -> ParseResult<Circuit> {
    let mut parser = Parser::new(source)?;
    let (dialect, version) = parser.parse_header()?;
    match expected {
        Some(expected) if expected != dialect => {
            return Err(ParseError::DialectMismatch {
                expected: expected.major(),
                found: version,
            });
        }
        _ => {}
    }
    while !parser.is_eof() {
        parser.parse_statement()?;
    }
    Ok(parser.circuit)
}

/// A resolved operand: the flat wires it names and whether it was a whole register.
struct Operand<T> {
    wires: Vec<T>,
    whole_register: bool,
}

enum WireRef {
    Element(String, u64),
    Register(String),
}

struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
    circuit: Circuit,
}

impl Parser {
    fn new(source: &str) -> ParseResult<Self> {
        let tokens =
            tokenize(source).map_err(|(line, fragment)| ParseError::LexerError { line, fragment })?;
        Ok(Self {
            tokens,
            pos: 0,
            circuit: Circuit::new("main"),
        })
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|t| &t.token)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(1, |t| t.line)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos)?.token.clone();
        self.pos += 1;
        Some(token)
    }

    #[allow(clippy::needless_pass_by_value)]
    fn expect(&mut self, expected: Token) -> ParseResult<()> {
        let line = self.line();
        let found = self
            .advance()
            .ok_or_else(|| ParseError::UnexpectedEof(format!("expected {expected}")))?;
        if std::mem::discriminant(&found) != std::mem::discriminant(&expected) {
            return Err(ParseError::UnexpectedToken {
                line,
                expected: expected.to_string(),
                found: found.to_string(),
            });
        }
        Ok(())
    }

    fn check(&self, token: &Token) -> bool {
        self.peek()
            .is_some_and(|t| std::mem::discriminant(t) == std::mem::discriminant(token))
    }

    fn consume(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn unexpected(&mut self, expected: &str) -> ParseError {
        let line = self.line();
        match self.advance() {
            Some(found) => ParseError::UnexpectedToken {
                line,
                expected: expected.to_string(),
                found: found.to_string(),
            },
            None => ParseError::UnexpectedEof(format!("expected {expected}")),
        }
    }

    fn identifier(&mut self) -> ParseResult<String> {
        match self.peek() {
            Some(Token::Identifier(_)) => match self.advance() {
                Some(Token::Identifier(name)) => Ok(name),
                _ => Err(self.unexpected("identifier")),
            },
            _ => Err(self.unexpected("identifier")),
        }
    }

    fn integer(&mut self) -> ParseResult<u64> {
        match self.peek() {
            Some(Token::IntLiteral(v)) => {
                let v = *v;
                self.pos += 1;
                Ok(v)
            }
            _ => Err(self.unexpected("integer")),
        }
    }

    fn size(&mut self) -> ParseResult<u32> {
        let line = self.line();
        let value = self.integer()?;
        u32::try_from(value).map_err(|_| ParseError::Unsupported {
            line,
            what: format!("register size {value}"),
        })
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn parse_header(&mut self) -> ParseResult<(Dialect, String)> {
        if !self.check(&Token::OpenQasm) {
            return Err(ParseError::InvalidVersion("missing OPENQASM header".into()));
        }
        self.pos += 1;
        let version = match self.advance() {
            Some(Token::FloatLiteral(v)) => format!("{v:.1}"),
            Some(Token::IntLiteral(v)) => format!("{v}"),
            other => {
                return Err(ParseError::InvalidVersion(
                    other.map_or_else(|| "end of input".into(), |t| t.to_string()),
                ));
            }
        };
        self.expect(Token::Semicolon)?;
        let dialect = match version.split('.').next() {
            Some("2") => Dialect::Qasm2,
            Some("3") => Dialect::Qasm3,
            _ => return Err(ParseError::InvalidVersion(version)),
        };
        Ok((dialect, version))
    }

    fn parse_statement(&mut self) -> ParseResult<()> {
        let line = self.line();
        match self.peek() {
            Some(Token::Include) => {
                self.pos += 1;
                if !matches!(self.peek(), Some(Token::StringLiteral(_))) {
                    return Err(self.unexpected("include path"));
                }
                self.pos += 1;
                self.expect(Token::Semicolon)
            }
            Some(Token::Qreg | Token::Creg) => {
                let quantum = self.check(&Token::Qreg);
                self.pos += 1;
                let name = self.identifier()?;
                self.expect(Token::LBracket)?;
                let size = self.size()?;
                self.expect(Token::RBracket)?;
                self.expect(Token::Semicolon)?;
                self.declare(quantum, name, size)
            }
            Some(Token::Qubit | Token::Bit) => {
                let quantum = self.check(&Token::Qubit);
                self.pos += 1;
                let size = if self.consume(&Token::LBracket) {
                    let size = self.size()?;
                    self.expect(Token::RBracket)?;
                    size
                } else {
                    1
                };
                let name = self.identifier()?;
                if !quantum && self.consume(&Token::Eq) {
                    self.declare(false, name.clone(), size)?;
                    return self.parse_measure_tail(WireRef::Register(name), line);
                }
                self.expect(Token::Semicolon)?;
                self.declare(quantum, name, size)
            }
            Some(Token::Measure) => {
                self.pos += 1;
                let qubits = self.parse_wire_ref()?;
                self.expect(Token::Arrow)?;
                let clbits = self.parse_wire_ref()?;
                self.expect(Token::Semicolon)?;
                self.apply_measure(qubits, clbits, line)
            }
            Some(Token::Reset) => {
                self.pos += 1;
                let targets = self.parse_qubit_list(line)?;
                for q in targets {
                    self.circuit.push(Instruction::reset(q))?;
                }
                Ok(())
            }
            Some(Token::Barrier) => {
                self.pos += 1;
                let targets = if self.check(&Token::Semicolon) {
                    self.pos += 1;
                    (0..self.circuit.num_qubits() as u32).map(QubitId).collect()
                } else {
                    self.parse_qubit_list(line)?
                };
                self.circuit.push(Instruction::barrier(targets))?;
                Ok(())
            }
            Some(Token::Identifier(_)) => {
                if self.is_assignment() {
                    let target = self.parse_wire_ref()?;
                    self.expect(Token::Eq)?;
                    self.parse_measure_tail(target, line)
                } else {
                    self.parse_gate_call(line)
                }
            }
            Some(Token::GateDef) => Err(self.unsupported(line, "gate definitions")),
            Some(Token::Opaque) => Err(self.unsupported(line, "opaque gates")),
            Some(Token::If) => Err(self.unsupported(line, "classically conditioned operations")),
            _ => Err(self.unexpected("statement")),
        }
    }

    fn unsupported(&self, line: usize, what: &str) -> ParseError {
        ParseError::Unsupported {
            line,
            what: what.to_string(),
        }
    }

    fn declare(&mut self, quantum: bool, name: String, size: u32) -> ParseResult<()> {
        if quantum {
            self.circuit.add_qreg(name, size)?;
        } else {
            self.circuit.add_creg(name, size)?;
        }
        Ok(())
    }

    /// `ident [ '[' int ']' ] '='` starts a classical assignment.
    fn is_assignment(&self) -> bool {
        match self.peek_at(1) {
            Some(Token::Eq) => true,
            Some(Token::LBracket) => {
                matches!(self.peek_at(2), Some(Token::IntLiteral(_)))
                    && matches!(self.peek_at(3), Some(Token::RBracket))
                    && matches!(self.peek_at(4), Some(Token::Eq))
            }
            _ => false,
        }
    }

    fn parse_measure_tail(&mut self, clbits: WireRef, line: usize) -> ParseResult<()> {
        self.expect(Token::Measure)?;
        let qubits = self.parse_wire_ref()?;
        self.expect(Token::Semicolon)?;
        self.apply_measure(qubits, clbits, line)
    }

    fn apply_measure(&mut self, qubits: WireRef, clbits: WireRef, line: usize) -> ParseResult<()> {
        let qubits = self.resolve_qubits(qubits, line)?;
        let clbits = self.resolve_clbits(clbits, line)?;
        if qubits.wires.len() != clbits.wires.len() {
            return Err(ParseError::RegisterSizeMismatch {
                line,
                detail: format!(
                    "measuring {} qubit(s) into {} bit(s)",
                    qubits.wires.len(),
                    clbits.wires.len()
                ),
            });
        }
        for (q, c) in qubits.wires.into_iter().zip(clbits.wires) {
            self.circuit.push(Instruction::measure(q, c))?;
        }
        Ok(())
    }

    fn parse_gate_call(&mut self, line: usize) -> ParseResult<()> {
        let name = self.identifier()?;
        let mut params = Vec::new();
        if self.consume(&Token::LParen) {
            if !self.check(&Token::RParen) {
                params.push(self.parse_expr()?);
                while self.consume(&Token::Comma) {
                    params.push(self.parse_expr()?);
                }
            }
            self.expect(Token::RParen)?;
        }

        let gate = Gate::from_name(&name, &params).ok_or_else(|| ParseError::UnknownGate {
            line,
            name: name.clone(),
            params: params.len(),
        })?;

        let mut operands = vec![self.parse_wire_ref()?];
        while self.consume(&Token::Comma) {
            operands.push(self.parse_wire_ref()?);
        }
        self.expect(Token::Semicolon)?;

        let operands = operands
            .into_iter()
            .map(|r| self.resolve_qubits(r, line))
            .collect::<ParseResult<Vec<_>>>()?;

        for qubits in broadcast(&operands, line)? {
            self.circuit.gate(gate, qubits)?;
        }
        Ok(())
    }

    fn parse_qubit_list(&mut self, line: usize) -> ParseResult<Vec<QubitId>> {
        let mut targets = Vec::new();
        loop {
            let r = self.parse_wire_ref()?;
            targets.extend(self.resolve_qubits(r, line)?.wires);
            if !self.consume(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::Semicolon)?;
        Ok(targets)
    }

    fn parse_wire_ref(&mut self) -> ParseResult<WireRef> {
        let name = self.identifier()?;
        if self.consume(&Token::LBracket) {
            let index = self.integer()?;
            self.expect(Token::RBracket)?;
            Ok(WireRef::Element(name, index))
        } else {
            Ok(WireRef::Register(name))
        }
    }

    fn resolve_qubits(&self, r: WireRef, line: usize) -> ParseResult<Operand<QubitId>> {
        resolve(r, line, |name| self.circuit.qreg(name), QubitId)
    }

    fn resolve_clbits(&self, r: WireRef, line: usize) -> ParseResult<Operand<ClbitId>> {
        resolve(r, line, |name| self.circuit.creg(name), ClbitId)
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn parse_expr(&mut self) -> ParseResult<f64> {
        let mut value = self.parse_term()?;
        loop {
            if self.consume(&Token::Plus) {
                value += self.parse_term()?;
            } else if self.consume(&Token::Minus) {
                value -= self.parse_term()?;
            } else {
                return Ok(value);
            }
        }
    }

    fn parse_term(&mut self) -> ParseResult<f64> {
        let mut value = self.parse_power()?;
        loop {
            if self.consume(&Token::Star) {
                value *= self.parse_power()?;
            } else if self.consume(&Token::Slash) {
                value /= self.parse_power()?;
            } else {
                return Ok(value);
            }
        }
    }

    fn parse_power(&mut self) -> ParseResult<f64> {
        let base = self.parse_unary()?;
        if self.consume(&Token::Power) {
            let exp = self.parse_power()?;
            return Ok(base.powf(exp));
        }
        Ok(base)
    }

    fn parse_unary(&mut self) -> ParseResult<f64> {
        if self.consume(&Token::Minus) {
            return Ok(-self.parse_unary()?);
        }
        if self.consume(&Token::Plus) {
            return self.parse_unary();
        }
        self.parse_primary()
    }

    #[allow(clippy::cast_precision_loss)]
    fn parse_primary(&mut self) -> ParseResult<f64> {
        let line = self.line();
        match self.peek() {
            Some(Token::FloatLiteral(v)) => {
                let v = *v;
                self.pos += 1;
                Ok(v)
            }
            Some(Token::IntLiteral(v)) => {
                let v = *v as f64;
                self.pos += 1;
                Ok(v)
            }
            Some(Token::Pi) => {
                self.pos += 1;
                Ok(std::f64::consts::PI)
            }
            Some(Token::Tau) => {
                self.pos += 1;
                Ok(std::f64::consts::TAU)
            }
            Some(Token::Euler) => {
                self.pos += 1;
                Ok(std::f64::consts::E)
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let value = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(value)
            }
            Some(Token::Identifier(_)) => {
                let name = self.identifier()?;
                self.expect(Token::LParen)?;
                let arg = self.parse_expr()?;
                self.expect(Token::RParen)?;
                let value = match name.as_str() {
                    "sin" => arg.sin(),
                    "cos" => arg.cos(),
                    "tan" => arg.tan(),
                    "exp" => arg.exp(),
                    "ln" => arg.ln(),
                    "sqrt" => arg.sqrt(),
                    _ => return Err(self.unsupported(line, &format!("function '{name}'"))),
                };
                Ok(value)
            }
            _ => Err(self.unexpected("expression")),
        }
    }
}

fn resolve<T>(
    r: WireRef,
    line: usize,
    lookup: impl Fn(&str) -> Option<(u32, u32)>,
    wrap: fn(u32) -> T,
) -> ParseResult<Operand<T>> {
    match r {
        WireRef::Register(name) => {
            let (base, size) =
                lookup(&name).ok_or(ParseError::UndefinedRegister { line, name })?;
            Ok(Operand {
                wires: (base..base + size).map(wrap).collect(),
                whole_register: true,
            })
        }
        WireRef::Element(name, index) => {
            let (base, size) = lookup(&name).ok_or_else(|| ParseError::UndefinedRegister {
                line,
                name: name.clone(),
            })?;
            if index >= u64::from(size) {
                return Err(ParseError::IndexOutOfBounds {
                    register: name,
                    index,
                    size,
                });
            }
            Ok(Operand {
                wires: vec![wrap(base + index as u32)],
                whole_register: false,
            })
        }
    }
}

/// Expand register operands element-wise; single qubits repeat.
fn broadcast(operands: &[Operand<QubitId>], line: usize) -> ParseResult<Vec<Vec<QubitId>>> {
    let widths: Vec<usize> = operands
        .iter()
        .filter(|o| o.whole_register)
        .map(|o| o.wires.len())
        .collect();
    let Some(&width) = widths.first() else {
        return Ok(vec![operands.iter().map(|o| o.wires[0]).collect()]);
    };
    if widths.iter().any(|w| *w != width) {
        return Err(ParseError::RegisterSizeMismatch {
            line,
            detail: format!("cannot broadcast over registers of sizes {widths:?}"),
        });
    }
    Ok((0..width)
        .map(|i| {
            operands
                .iter()
                .map(|o| if o.whole_register { o.wires[i] } else { o.wires[0] })
                .collect()
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use qpilot_ir::InstructionKind;

    #[test]
    fn test_parse_qasm2_bell() {
        let source = r#"
            OPENQASM 2.0;
            include "qelib1.inc";
            qreg q[2];
            creg c[2];
            h q[0];
            cx q[0], q[1];
            measure q -> c;
        "#;
        let circuit = parse_qasm2(source).unwrap();
        assert_eq!(circuit.num_qubits(), 2);
        assert_eq!(circuit.num_clbits(), 2);
        assert_eq!(circuit.instructions().len(), 4);
        assert_eq!(circuit.depth(), 3);
    }

    #[test]
    fn test_parse_qasm3_assignment_measure() {
        let source = r#"
            OPENQASM 3.0;
            include "stdgates.inc";
            qubit[2] q;
            bit[2] c;
            x q[1];
            c[1] = measure q[1];
            c = measure q;
        "#;
        let circuit = parse_qasm3(source).unwrap();
        assert_eq!(circuit.instructions().len(), 4);
        assert!(circuit.instructions()[1].is_measure());
        assert_eq!(circuit.instructions()[1].clbits, vec![ClbitId(1)]);
    }

    #[test]
    fn test_parse_qasm3_bit_declaration_with_measure() {
        let source = "OPENQASM 3; qubit[3] q; bit[3] c = measure q;";
        let circuit = parse(source).unwrap();
        assert_eq!(circuit.num_clbits(), 3);
        assert_eq!(circuit.instructions().len(), 3);
    }

    #[test]
    fn test_parameter_expressions() {
        let source = "OPENQASM 2.0; qreg q[1]; rx(-pi/2) q[0]; u3(2*pi, 0.5e1, sqrt(4)) q[0];";
        let circuit = parse(source).unwrap();
        let gates: Vec<_> = circuit
            .instructions()
            .iter()
            .filter_map(|i| i.as_gate().copied())
            .collect();
        assert_eq!(gates[0], Gate::Rx(-std::f64::consts::FRAC_PI_2));
        assert_eq!(gates[1], Gate::U(std::f64::consts::TAU, 5.0, 2.0));
    }

    #[test]
    fn test_register_broadcast() {
        let source = "OPENQASM 2.0; qreg a[3]; qreg b[3]; qreg t[1]; cx a, b; ccx a, b, t[0];";
        let circuit = parse(source).unwrap();
        assert_eq!(circuit.instructions().len(), 6);
        assert_eq!(circuit.instructions()[2].qubits, vec![QubitId(2), QubitId(5)]);
        assert_eq!(
            circuit.instructions()[5].qubits,
            vec![QubitId(2), QubitId(5), QubitId(6)]
        );
    }

    #[test]
    fn test_broadcast_size_mismatch() {
        let source = "OPENQASM 2.0; qreg a[2]; qreg b[3]; cx a, b;";
        assert!(matches!(
            parse(source),
            Err(ParseError::RegisterSizeMismatch { .. })
        ));
    }

    #[test]
    fn test_barrier_without_operands_covers_all_qubits() {
        let circuit = parse("OPENQASM 3.0; qubit[3] q; barrier;").unwrap();
        assert!(matches!(
            circuit.instructions()[0].kind,
            InstructionKind::Barrier
        ));
        assert_eq!(circuit.instructions()[0].qubits.len(), 3);
    }

    #[test]
    fn test_dialect_mismatch() {
        let err = parse_qasm2("OPENQASM 3.0; qubit q;").unwrap_err();
        assert!(matches!(err, ParseError::DialectMismatch { expected: 2, .. }));
    }

    #[test]
    fn test_missing_header() {
        assert!(matches!(
            parse("qreg q[1];"),
            Err(ParseError::InvalidVersion(_))
        ));
    }

    #[test]
    fn test_unknown_gate_reports_line() {
        let err = parse("OPENQASM 2.0;\nqreg q[1];\nfoo q[0];").unwrap_err();
        assert!(matches!(err, ParseError::UnknownGate { line: 3, ref name, .. } if name == "foo"));
    }

    #[test]
    fn test_undefined_register_and_bounds() {
        assert!(matches!(
            parse("OPENQASM 2.0; h q[0];"),
            Err(ParseError::UndefinedRegister { .. })
        ));
        assert!(matches!(
            parse("OPENQASM 2.0; qreg q[1]; h q[4];"),
            Err(ParseError::IndexOutOfBounds { index: 4, .. })
        ));
    }

    #[test]
    fn test_gate_definition_is_unsupported() {
        let err = parse("OPENQASM 2.0; gate g a { h a; }").unwrap_err();
        assert!(matches!(err, ParseError::Unsupported { .. }));
    }
}
