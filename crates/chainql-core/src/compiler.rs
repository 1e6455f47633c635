//! Query compiler: the event surface driven by a parse-tree walker.
//!
//! A front end walks the parse tree of a query and calls the `enter_*` /
//! `exit_*` methods in tree order, calling [`QueryCompiler::set_position`]
//! before each so that errors point at the query text. Scope events go to
//! the [`SpecificationComposer`]; boolean expression events go to the
//! [`PredicateBuilder`].

use std::collections::HashMap;
use std::path::PathBuf;

use crate::abi::{LogEntrySignature, ParameterSpecification, SmartContractQuery, TypedValueAccessor};
use crate::accessor::{parse_literal, split_elements, BlockchainVariable, ValueAccessor, ValueMutator};
use crate::address::AddressListSpecification;
use crate::composer::SpecificationComposer;
use crate::error::{BuildError, BuildErrorKind, SourcePosition};
use crate::instruction::{Assignment, Emission, Instruction, MethodCall, Program, XesParameter};
use crate::methods::Method;
use crate::predicate::{Comparator, PredicateBuilder};
use crate::range::{BlockNumberSpecification, BlockRange};
use crate::value::{Value, ValueType};
use crate::writers::XesType;

// ─── Parse-tree fragments ─────────────────────────────────────────────────────

/// A value operand as it appears in the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueExpr {
    /// Literal source text; its type is inferred.
    Literal(String),
    /// Literal source text with an explicit type keyword.
    Typed { ty: String, text: String },
    /// A user or blockchain variable.
    Variable(String),
}

impl ValueExpr {
    pub fn literal(text: impl Into<String>) -> Self {
        Self::Literal(text.into())
    }

    pub fn typed(ty: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Typed {
            ty: ty.into(),
            text: text.into(),
        }
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Self::Variable(name.into())
    }
}

/// One bound of `BLOCKS (from) (to)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockBound {
    Number(ValueExpr),
    Current,
    Earliest,
    Continuous,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressList {
    Any,
    Literals(Vec<String>),
    Variable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventParameter {
    pub ty: String,
    pub name: String,
    pub indexed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSignature {
    pub name: String,
    pub parameters: Vec<EventParameter>,
}

/// A read declared in a smart-contract filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractRead {
    /// `name(type value, ...) returns (type name, ...)`
    Function {
        name: String,
        inputs: Vec<(String, ValueExpr)>,
        outputs: Vec<(String, String)>,
    },
    /// `type name`
    Variable { ty: String, name: String },
}

/// `type name = value` inside an XES emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XesField {
    pub ty: String,
    pub name: String,
    pub value: ValueExpr,
}

// ─── Compiler ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct QueryCompiler {
    composer: SpecificationComposer,
    predicates: PredicateBuilder,
    variable_types: HashMap<String, ValueType>,
    /// Types fixed by a `type name = value` declaration.
    declared_types: HashMap<String, ValueType>,
    position: Option<SourcePosition>,
}

impl QueryCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Position of the parse-tree node of the next event.
    pub fn set_position(&mut self, line: u32, column: u32) {
        self.position = Some(SourcePosition::new(line, column));
    }

    fn located<T>(&self, result: Result<T, BuildError>) -> Result<T, BuildError> {
        result.map_err(|err| err.at(self.position))
    }

    fn add(&mut self, instruction: Result<Instruction, BuildError>) -> Result<(), BuildError> {
        let result = instruction.and_then(|i| self.composer.add_instruction(i));
        self.located(result)
    }

    // ─── Program and directives ───────────────────────────────────────────────

    pub fn enter_program(&mut self) -> Result<(), BuildError> {
        let result = self.composer.prepare_program_build();
        self.located(result)
    }

    pub fn exit_program(&mut self) -> Result<Program, BuildError> {
        let result = self.composer.build_program();
        self.located(result)
    }

    /// `SET OUTPUT FOLDER "<path>"`
    pub fn output_folder(&mut self, literal: &str) -> Result<(), BuildError> {
        let folder = string_literal(literal, "output folder").map(|f| Instruction::SetOutputFolder(PathBuf::from(f)));
        self.add(folder)
    }

    /// `SET CONNECTION "<url>"`
    pub fn connection(&mut self, literal: &str) -> Result<(), BuildError> {
        let url = string_literal(literal, "connection").map(Instruction::Connect);
        self.add(url)
    }

    // ─── Scopes ───────────────────────────────────────────────────────────────

    pub fn enter_block_filter(&mut self) -> Result<(), BuildError> {
        let result = self.composer.prepare_block_range_build();
        self.located(result)
    }

    pub fn exit_block_filter(&mut self, from: &BlockBound, to: &BlockBound) -> Result<(), BuildError> {
        let result = self
            .block_number(from)
            .and_then(|from| Ok((from, self.block_number(to)?)))
            .and_then(|(from, to)| BlockRange::new(from, to))
            .and_then(|range| self.composer.build_block_range_filter(range));
        self.located(result)
    }

    pub fn enter_transaction_filter(&mut self) -> Result<(), BuildError> {
        let result = self.composer.prepare_transaction_filter_build();
        self.located(result)
    }

    pub fn exit_transaction_filter(
        &mut self,
        senders: &AddressList,
        recipients: &AddressList,
    ) -> Result<(), BuildError> {
        let result = address_list(senders)
            .and_then(|senders| Ok((senders, address_list(recipients)?)))
            .and_then(|(senders, recipients)| self.composer.build_transaction_filter(senders, recipients));
        self.located(result)
    }

    pub fn enter_log_entry_filter(&mut self) -> Result<(), BuildError> {
        let result = self.composer.prepare_log_entry_filter_build();
        self.located(result)
    }

    pub fn exit_log_entry_filter(
        &mut self,
        contracts: &AddressList,
        signature: Option<&EventSignature>,
    ) -> Result<(), BuildError> {
        let result = address_list(contracts)
            .and_then(|contracts| Ok((contracts, signature.map(log_signature).transpose()?)))
            .and_then(|(contracts, signature)| self.composer.build_log_entry_filter(contracts, signature));
        self.located(result)
    }

    pub fn enter_smart_contract_filter(&mut self) -> Result<(), BuildError> {
        let result = self.composer.prepare_smart_contract_filter_build();
        self.located(result)
    }

    pub fn exit_smart_contract_filter(
        &mut self,
        contract: &ValueExpr,
        reads: &[ContractRead],
    ) -> Result<(), BuildError> {
        let result = self
            .accessor(contract)
            .and_then(|contract| {
                let queries = reads
                    .iter()
                    .map(|read| self.contract_query(read))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((contract, queries))
            })
            .and_then(|(contract, queries)| self.composer.build_smart_contract_filter(contract, queries));
        self.located(result)
    }

    pub fn enter_generic_filter(&mut self) -> Result<(), BuildError> {
        let result = self.composer.prepare_generic_filter_build();
        self.located(result)
    }

    /// Close a generic filter with the boolean expression built since it
    /// was entered.
    pub fn exit_generic_filter(&mut self) -> Result<(), BuildError> {
        let result = self
            .predicates
            .finish()
            .and_then(|predicate| self.composer.build_generic_filter(predicate));
        self.located(result)
    }

    // ─── Boolean expressions ──────────────────────────────────────────────────

    /// A value leaf of a boolean expression.
    pub fn operand(&mut self, value: &ValueExpr) -> Result<(), BuildError> {
        let result = self.accessor(value).map(|a| self.predicates.push_value(a));
        self.located(result)
    }

    pub fn exit_comparison(&mut self, comparator: &str) -> Result<(), BuildError> {
        let result = Comparator::parse(comparator).and_then(|op| self.predicates.exit_comparison(op));
        self.located(result)
    }

    pub fn exit_and(&mut self) -> Result<(), BuildError> {
        let result = self.predicates.exit_and();
        self.located(result)
    }

    pub fn exit_or(&mut self) -> Result<(), BuildError> {
        let result = self.predicates.exit_or();
        self.located(result)
    }

    pub fn exit_not(&mut self) -> Result<(), BuildError> {
        let result = self.predicates.exit_not();
        self.located(result)
    }

    // ─── Statements ───────────────────────────────────────────────────────────

    /// `type name = value`
    pub fn variable_declaration(&mut self, ty: &str, name: &str, value: &ValueExpr) -> Result<(), BuildError> {
        let instruction = self.declaration(ty, name, value);
        self.add(instruction)
    }

    fn declaration(&mut self, ty: &str, name: &str, value: &ValueExpr) -> Result<Instruction, BuildError> {
        let declared = ValueType::parse(ty).ok_or_else(|| BuildErrorKind::UnsupportedType(ty.to_string()))?;
        let accessor = match value {
            ValueExpr::Literal(text) => ValueAccessor::of_literal(&declared, text)?,
            other => self.accessor(other)?,
        };
        check_assignable(name, &declared, &self.static_type(&accessor))?;
        let target = ValueMutator::of_variable(name)?;
        self.variable_types.insert(name.to_string(), declared.clone());
        self.declared_types.insert(name.to_string(), declared);
        Ok(Instruction::Assignment(Assignment { target, value: accessor }))
    }

    /// `name = value`
    ///
    /// A declared variable keeps its declared type; the value must fit it.
    pub fn assignment(&mut self, name: &str, value: &ValueExpr) -> Result<(), BuildError> {
        let instruction = self.reassignment(name, value);
        self.add(instruction)
    }

    fn reassignment(&mut self, name: &str, value: &ValueExpr) -> Result<Instruction, BuildError> {
        let accessor = self.accessor(value)?;
        let actual = self.static_type(&accessor);
        let ty = match self.declared_types.get(name) {
            Some(declared) => {
                check_assignable(name, declared, &actual)?;
                declared.clone()
            }
            None => actual,
        };
        let target = ValueMutator::of_variable(name)?;
        self.variable_types.insert(name.to_string(), ty);
        Ok(Instruction::Assignment(Assignment { target, value: accessor }))
    }

    /// `[target =] method(args...)`
    pub fn method_call(&mut self, target: Option<&str>, method: &str, args: &[ValueExpr]) -> Result<(), BuildError> {
        let instruction = self.method(target, method, args);
        self.add(instruction)
    }

    fn method(&mut self, target: Option<&str>, method: &str, args: &[ValueExpr]) -> Result<Instruction, BuildError> {
        let args = args
            .iter()
            .map(|arg| self.accessor(arg))
            .collect::<Result<Vec<_>, _>>()?;
        let types: Vec<ValueType> = args.iter().map(|a| self.static_type(a)).collect();
        let method = Method::resolve(method, &types)?;
        let target = match target {
            Some(name) => {
                self.variable_types.remove(name);
                Some(ValueMutator::of_variable(name)?)
            }
            None => None,
        };
        Ok(Instruction::MethodCall(MethodCall { method, args, target }))
    }

    /// `EMIT CSV table (name = value, ...)`
    pub fn emit_csv(&mut self, table: &str, columns: &[(String, ValueExpr)]) -> Result<(), BuildError> {
        let instruction = self.named(columns).map(|columns| {
            Instruction::Emit(Emission::Csv {
                table: table.to_string(),
                columns,
            })
        });
        self.add(instruction)
    }

    /// `EMIT LOG LINE (value, ...)`
    pub fn emit_log(&mut self, values: &[ValueExpr]) -> Result<(), BuildError> {
        let instruction = values
            .iter()
            .map(|v| self.accessor(v))
            .collect::<Result<Vec<_>, _>>()
            .map(|values| Instruction::Emit(Emission::Log(values)));
        self.add(instruction)
    }

    /// `EMIT XES TRACE (pid, piid) (fields...)`
    pub fn emit_xes_trace(&mut self, pid: &ValueExpr, piid: &ValueExpr, fields: &[XesField]) -> Result<(), BuildError> {
        let instruction = (|| -> Result<Instruction, BuildError> {
            Ok(Instruction::Emit(Emission::XesTrace {
                pid: self.accessor(pid)?,
                piid: self.accessor(piid)?,
                parameters: self.xes_parameters(fields)?,
            }))
        })();
        self.add(instruction)
    }

    /// `EMIT XES EVENT (pid, piid, eid?) (fields...)`
    pub fn emit_xes_event(
        &mut self,
        pid: &ValueExpr,
        piid: &ValueExpr,
        eid: Option<&ValueExpr>,
        fields: &[XesField],
    ) -> Result<(), BuildError> {
        let instruction = (|| -> Result<Instruction, BuildError> {
            Ok(Instruction::Emit(Emission::XesEvent {
                pid: self.accessor(pid)?,
                piid: self.accessor(piid)?,
                eid: eid.map(|eid| self.accessor(eid)).transpose()?,
                parameters: self.xes_parameters(fields)?,
            }))
        })();
        self.add(instruction)
    }

    /// `EMIT HTTP REQUEST (uri) (name = value, ...)`
    pub fn emit_http(&mut self, uri: &ValueExpr, fields: &[(String, ValueExpr)]) -> Result<(), BuildError> {
        let instruction = self.accessor(uri).and_then(|uri| {
            Ok(Instruction::Emit(Emission::Http {
                uri,
                fields: self.named(fields)?,
            }))
        });
        self.add(instruction)
    }

    // ─── Helpers ──────────────────────────────────────────────────────────────

    fn accessor(&self, value: &ValueExpr) -> Result<ValueAccessor, BuildError> {
        match value {
            ValueExpr::Variable(name) => Ok(ValueAccessor::of_variable(name)),
            ValueExpr::Typed { ty, text } => {
                let ty = ValueType::parse(ty).ok_or_else(|| BuildErrorKind::UnsupportedType(ty.clone()))?;
                ValueAccessor::of_literal(&ty, text)
            }
            ValueExpr::Literal(text) => {
                let ty = infer_literal_type(text)
                    .ok_or_else(|| BuildErrorKind::UnresolvedLiteral(text.clone()))?;
                ValueAccessor::of_literal(&ty, text)
            }
        }
    }

    /// Type known at compile time; `any` when it depends on run-time data.
    fn static_type(&self, accessor: &ValueAccessor) -> ValueType {
        match accessor {
            ValueAccessor::Literal(value) => value.value_type(),
            ValueAccessor::Variable(name) => self.variable_types.get(name).cloned().unwrap_or(ValueType::Any),
            ValueAccessor::Blockchain(var) => blockchain_variable_type(*var),
        }
    }

    fn named(&self, fields: &[(String, ValueExpr)]) -> Result<Vec<(String, ValueAccessor)>, BuildError> {
        fields
            .iter()
            .map(|(name, value)| -> Result<_, BuildError> { Ok((name.clone(), self.accessor(value)?)) })
            .collect()
    }

    fn xes_parameters(&self, fields: &[XesField]) -> Result<Vec<XesParameter>, BuildError> {
        fields
            .iter()
            .map(|field| -> Result<_, BuildError> {
                let kind = XesType::parse(&field.ty)
                    .ok_or_else(|| BuildErrorKind::UnsupportedXesType(field.ty.clone()))?;
                Ok(XesParameter::new(&field.name, kind, self.accessor(&field.value)?))
            })
            .collect()
    }

    fn block_number(&self, bound: &BlockBound) -> Result<BlockNumberSpecification, BuildError> {
        Ok(match bound {
            BlockBound::Number(value) => {
                let accessor = self.accessor(value)?;
                let ty = self.static_type(&accessor);
                if !ValueType::Int.accepts(&ty) {
                    return Err(BuildErrorKind::InvalidRange(format!("block number of type {ty}")).into());
                }
                BlockNumberSpecification::of_block_number(accessor)
            }
            BlockBound::Current => BlockNumberSpecification::of_current(),
            BlockBound::Earliest => BlockNumberSpecification::of_earliest(),
            BlockBound::Continuous => BlockNumberSpecification::of_continuous(),
        })
    }

    fn contract_query(&self, read: &ContractRead) -> Result<SmartContractQuery, BuildError> {
        match read {
            ContractRead::Function { name, inputs, outputs } => {
                let inputs = inputs
                    .iter()
                    .map(|(ty, value)| {
                        let accessor = match value {
                            ValueExpr::Literal(text) => {
                                let value_type = ValueType::parse(ty)
                                    .ok_or_else(|| BuildErrorKind::UnsupportedType(ty.clone()))?;
                                ValueAccessor::of_literal(&value_type, text)?
                            }
                            other => self.accessor(other)?,
                        };
                        TypedValueAccessor::new(ty, accessor)
                    })
                    .collect::<Result<Vec<_>, BuildError>>()?;
                let outputs = outputs
                    .iter()
                    .map(|(ty, name)| ParameterSpecification::new(name, ty, false))
                    .collect::<Result<Vec<_>, _>>()?;
                SmartContractQuery::member_function(name, inputs, outputs)
            }
            ContractRead::Variable { ty, name } => {
                SmartContractQuery::member_variable(ParameterSpecification::new(name, ty, false)?)
            }
        }
    }
}

fn string_literal(literal: &str, directive: &str) -> Result<String, BuildError> {
    match parse_literal(&ValueType::Str, literal) {
        Ok(Value::Str(text)) => Ok(text),
        _ => Err(BuildErrorKind::Other(format!("{directive} must be a string literal, got {literal}")).into()),
    }
}

fn address_list(list: &AddressList) -> Result<AddressListSpecification, BuildError> {
    match list {
        AddressList::Any => Ok(AddressListSpecification::Any),
        AddressList::Variable(name) => Ok(AddressListSpecification::Variable(name.clone())),
        AddressList::Literals(addresses) => addresses
            .iter()
            .map(|a| parse_literal(&ValueType::Address, a).map(|_| a.trim().to_string()))
            .collect::<Result<Vec<_>, _>>()
            .map(AddressListSpecification::Addresses),
    }
}

fn log_signature(signature: &EventSignature) -> Result<LogEntrySignature, BuildError> {
    let parameters = signature
        .parameters
        .iter()
        .map(|p| ParameterSpecification::new(&p.name, &p.ty, p.indexed))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(LogEntrySignature::new(&signature.name, parameters))
}

/// Infer the type of untyped literal text.
fn infer_literal_type(text: &str) -> Option<ValueType> {
    let text = text.trim();
    if text == "true" || text == "false" {
        return Some(ValueType::Bool);
    }
    if text.starts_with('"') {
        return Some(ValueType::Str);
    }
    if let Some(hex_digits) = text.strip_prefix("0x") {
        return Some(if hex_digits.len() == 40 {
            ValueType::Address
        } else {
            ValueType::Bytes
        });
    }
    if let Some(body) = text.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
        let first = split_elements(body).into_iter().next()?;
        return infer_literal_type(first).map(|t| ValueType::List(Box::new(t)));
    }
    let digits = text.strip_prefix('-').unwrap_or(text);
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        return Some(ValueType::Int);
    }
    None
}

fn blockchain_variable_type(var: BlockchainVariable) -> ValueType {
    use BlockchainVariable::*;
    match var {
        BlockMiner | TxFrom | LogAddress => ValueType::Address,
        BlockHash | BlockParentHash | TxHash | TxInput | LogTransactionHash => ValueType::Str,
        LogData => ValueType::Bytes,
        LogRemoved => ValueType::Bool,
        // `tx.to` is null for contract creations.
        TxTo => ValueType::Any,
        _ => ValueType::Int,
    }
}

fn check_assignable(name: &str, declared: &ValueType, actual: &ValueType) -> Result<(), BuildError> {
    if declared.accepts(actual) {
        Ok(())
    } else {
        Err(BuildErrorKind::TypeMismatch {
            name: name.to_string(),
            declared: declared.to_string(),
            actual: actual.to_string(),
        }
        .into())
    }
}
