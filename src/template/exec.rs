//! Template execution against a parameter set.

use std::borrow::Cow;
use std::fmt::Write as _;

use super::error::RenderError;
use super::parser::{Builtin, Command, Node, Operand, Pipeline};
use crate::domain::{ParamValue, Parameters};

/// A value flowing through pipelines. Borrows from the template and the
/// parameters wherever it can.
#[derive(Debug, Clone)]
pub(crate) enum Value<'a> {
    Map(&'a Parameters),
    Str(Cow<'a, str>),
    List(&'a [String]),
    Int(i64),
    Bool(bool),
}

impl<'a> Value<'a> {
    fn from_param(value: &'a ParamValue) -> Self {
        match value {
            ParamValue::Single(s) => Value::Str(Cow::Borrowed(s)),
            ParamValue::List(items) => Value::List(items),
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Value::Map(params) => !params.is_empty(),
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Int(n) => *n != 0,
            Value::Bool(b) => *b,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Map(_) => "map",
            Value::Str(_) => "string",
            Value::List(_) => "[]string",
            Value::Int(_) => "int",
            Value::Bool(_) => "bool",
        }
    }

    fn is_string(&self) -> bool {
        matches!(self, Value::Str(_))
    }

    fn write_to(&self, out: &mut String) {
        match self {
            Value::Str(s) => out.push_str(s),
            Value::Int(n) => {
                let _ = write!(out, "{n}");
            }
            Value::Bool(b) => {
                let _ = write!(out, "{b}");
            }
            Value::List(items) => {
                out.push('[');
                out.push_str(&items.join(" "));
                out.push(']');
            }
            Value::Map(params) => {
                out.push_str("map[");
                for (i, (key, value)) in params.iter().enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    out.push_str(key);
                    out.push(':');
                    Value::from_param(value).write_to(out);
                }
                out.push(']');
            }
        }
    }
}

pub(crate) fn execute(
    name: &str,
    nodes: &[Node],
    params: &Parameters,
) -> Result<String, RenderError> {
    let mut exec = Exec {
        name,
        out: String::new(),
        root: Value::Map(params),
    };
    let root = exec.root.clone();
    exec.walk(nodes, &root)?;
    Ok(exec.out)
}

struct Exec<'a> {
    name: &'a str,
    out: String,
    root: Value<'a>,
}

impl<'a> Exec<'a> {
    fn error(&self, line: usize, message: impl Into<String>) -> RenderError {
        RenderError::eval(self.name, line, message)
    }

    fn walk(&mut self, nodes: &'a [Node], dot: &Value<'a>) -> Result<(), RenderError> {
        for node in nodes {
            match node {
                Node::Text(text) => self.out.push_str(text),
                Node::Action(pipe) => {
                    let value = self.eval_pipeline(pipe, dot)?;
                    value.write_to(&mut self.out);
                }
                Node::If {
                    cond,
                    body,
                    otherwise,
                } => {
                    if self.eval_pipeline(cond, dot)?.truthy() {
                        self.walk(body, dot)?;
                    } else {
                        self.walk(otherwise, dot)?;
                    }
                }
                Node::With {
                    pipe,
                    body,
                    otherwise,
                } => {
                    let value = self.eval_pipeline(pipe, dot)?;
                    if value.truthy() {
                        self.walk(body, &value)?;
                    } else {
                        self.walk(otherwise, dot)?;
                    }
                }
                Node::Range {
                    pipe,
                    body,
                    otherwise,
                } => self.walk_range(pipe, body, otherwise, dot)?,
            }
        }
        Ok(())
    }

    fn walk_range(
        &mut self,
        pipe: &'a Pipeline,
        body: &'a [Node],
        otherwise: &'a [Node],
        dot: &Value<'a>,
    ) -> Result<(), RenderError> {
        let value = self.eval_pipeline(pipe, dot)?;
        if !value.truthy() {
            return match value {
                Value::Str(_) | Value::Bool(_) => Err(self.error(
                    pipe.line,
                    format!("range can't iterate over {}", value.type_name()),
                )),
                _ => self.walk(otherwise, dot),
            };
        }
        match value {
            Value::List(items) => {
                for item in items {
                    self.walk(body, &Value::Str(Cow::Borrowed(item)))?;
                }
            }
            Value::Map(params) => {
                for (_, param) in params.iter() {
                    self.walk(body, &Value::from_param(param))?;
                }
            }
            Value::Int(n) => {
                for i in 0..n {
                    self.walk(body, &Value::Int(i))?;
                }
            }
            other => {
                return Err(self.error(
                    pipe.line,
                    format!("range can't iterate over {}", other.type_name()),
                ));
            }
        }
        Ok(())
    }

    fn eval_pipeline(&mut self, pipe: &'a Pipeline, dot: &Value<'a>) -> Result<Value<'a>, RenderError> {
        let mut piped = None;
        for command in &pipe.commands {
            piped = Some(self.eval_command(command, dot, piped.take(), pipe.line)?);
        }
        piped.ok_or_else(|| self.error(pipe.line, "missing value for command"))
    }

    fn eval_command(
        &mut self,
        command: &'a Command,
        dot: &Value<'a>,
        piped: Option<Value<'a>>,
        line: usize,
    ) -> Result<Value<'a>, RenderError> {
        let Some((first, rest)) = command.args.split_first() else {
            return Err(self.error(line, "empty command"));
        };
        match first {
            Operand::Func(Builtin::And) => self.short_circuit(rest, piped, dot, line, false),
            Operand::Func(Builtin::Or) => self.short_circuit(rest, piped, dot, line, true),
            Operand::Func(func) => {
                let mut args = Vec::with_capacity(rest.len() + 1);
                for operand in rest {
                    args.push(self.eval_operand(operand, dot, line)?);
                }
                args.extend(piped);
                self.call(*func, args, line)
            }
            operand => self.eval_operand(operand, dot, line),
        }
    }

    /// `and` stops at the first falsy argument, `or` at the first truthy one.
    fn short_circuit(
        &mut self,
        operands: &'a [Operand],
        piped: Option<Value<'a>>,
        dot: &Value<'a>,
        line: usize,
        stop_when: bool,
    ) -> Result<Value<'a>, RenderError> {
        let name = if stop_when { "or" } else { "and" };
        if operands.is_empty() && piped.is_none() {
            return Err(self.error(line, format!("wrong number of args for {name}: want at least 1 got 0")));
        }
        let mut last = None;
        for operand in operands {
            let value = self.eval_operand(operand, dot, line)?;
            if value.truthy() == stop_when {
                return Ok(value);
            }
            last = Some(value);
        }
        if let Some(value) = piped {
            return Ok(value);
        }
        last.ok_or_else(|| self.error(line, format!("wrong number of args for {name}")))
    }

    fn eval_operand(&mut self, operand: &'a Operand, dot: &Value<'a>, line: usize) -> Result<Value<'a>, RenderError> {
        match operand {
            Operand::Dot => Ok(dot.clone()),
            Operand::Field(path) => self.lookup(dot, path, line),
            Operand::Root(path) => {
                let root = self.root.clone();
                self.lookup(&root, path, line)
            }
            Operand::Str(s) => Ok(Value::Str(Cow::Borrowed(s))),
            Operand::Int(n) => Ok(Value::Int(*n)),
            Operand::Bool(b) => Ok(Value::Bool(*b)),
            Operand::Func(func) => self.call(*func, Vec::new(), line),
            Operand::Sub(pipe) => self.eval_pipeline(pipe, dot),
        }
    }

    fn lookup(&self, base: &Value<'a>, path: &[String], line: usize) -> Result<Value<'a>, RenderError> {
        let mut current = base.clone();
        for key in path {
            current = match current {
                Value::Map(params) => match params.get(key) {
                    Some(value) => Value::from_param(value),
                    None => {
                        return Err(RenderError::MissingKey {
                            name: self.name.to_string(),
                            line,
                            key: key.clone(),
                        });
                    }
                },
                other => {
                    return Err(self.error(
                        line,
                        format!("can't evaluate field {key} in type {}", other.type_name()),
                    ));
                }
            };
        }
        Ok(current)
    }

    fn call(&self, func: Builtin, args: Vec<Value<'a>>, line: usize) -> Result<Value<'a>, RenderError> {
        match func {
            Builtin::Len => {
                self.check_arity(func, args.len(), 1, line)?;
                let len = match &args[0] {
                    Value::Str(s) => s.len(),
                    Value::List(items) => items.len(),
                    Value::Map(params) => params.len(),
                    other => {
                        return Err(self.error(line, format!("len of type {}", other.type_name())));
                    }
                };
                Ok(Value::Int(len as i64))
            }
            Builtin::Index => self.index(args, line),
            Builtin::Eq => {
                if args.len() < 2 {
                    return Err(self.error(line, "missing argument for comparison"));
                }
                let (first, rest) = args.split_at(1);
                for other in rest {
                    if self.equal(&first[0], other, line)? {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Builtin::Ne => {
                self.check_arity(func, args.len(), 2, line)?;
                Ok(Value::Bool(!self.equal(&args[0], &args[1], line)?))
            }
            Builtin::Not => {
                self.check_arity(func, args.len(), 1, line)?;
                Ok(Value::Bool(!args[0].truthy()))
            }
            Builtin::Print => Ok(Value::Str(Cow::Owned(sprint(&args)))),
            Builtin::Join => {
                self.check_arity(func, args.len(), 2, line)?;
                match (&args[0], &args[1]) {
                    (Value::List(items), Value::Str(sep)) => {
                        Ok(Value::Str(Cow::Owned(items.join(&**sep))))
                    }
                    (Value::Str(single), Value::Str(_)) => Ok(Value::Str(single.clone())),
                    (list, sep) => Err(self.error(
                        line,
                        format!(
                            "join wants ([]string, string), got ({}, {})",
                            list.type_name(),
                            sep.type_name()
                        ),
                    )),
                }
            }
            Builtin::And | Builtin::Or => {
                let stop_when = func == Builtin::Or;
                let mut last = None;
                for value in args {
                    if value.truthy() == stop_when {
                        return Ok(value);
                    }
                    last = Some(value);
                }
                last.ok_or_else(|| {
                    self.error(
                        line,
                        format!("wrong number of args for {}: want at least 1 got 0", func.name()),
                    )
                })
            }
        }
    }

    fn check_arity(&self, func: Builtin, got: usize, want: usize, line: usize) -> Result<(), RenderError> {
        if got == want {
            return Ok(());
        }
        Err(self.error(
            line,
            format!("wrong number of args for {}: want {want} got {got}", func.name()),
        ))
    }

    fn index(&self, args: Vec<Value<'a>>, line: usize) -> Result<Value<'a>, RenderError> {
        let mut args = args.into_iter();
        let Some(mut current) = args.next() else {
            return Err(self.error(line, "wrong number of args for index: want at least 1 got 0"));
        };
        for key in args {
            current = match (&current, &key) {
                (Value::List(items), Value::Int(i)) => {
                    let item = usize::try_from(*i).ok().and_then(|i| items.get(i));
                    match item {
                        Some(item) => Value::Str(Cow::Borrowed(item)),
                        None => {
                            return Err(self.error(line, format!("error calling index: index out of range: {i}")));
                        }
                    }
                }
                (Value::Str(s), Value::Int(i)) => {
                    let byte = usize::try_from(*i).ok().and_then(|i| s.as_bytes().get(i));
                    match byte {
                        Some(byte) => Value::Int(i64::from(*byte)),
                        None => {
                            return Err(self.error(line, format!("error calling index: index out of range: {i}")));
                        }
                    }
                }
                (Value::Map(params), Value::Str(k)) => match params.get(k) {
                    Some(value) => Value::from_param(value),
                    None => Value::Str(Cow::Borrowed("")),
                },
                (target, key) => {
                    return Err(self.error(
                        line,
                        format!(
                            "error calling index: cannot index {} with {}",
                            target.type_name(),
                            key.type_name()
                        ),
                    ));
                }
            };
        }
        Ok(current)
    }

    fn equal(&self, a: &Value<'a>, b: &Value<'a>, line: usize) -> Result<bool, RenderError> {
        match (a, b) {
            (Value::Str(x), Value::Str(y)) => Ok(x == y),
            (Value::Int(x), Value::Int(y)) => Ok(x == y),
            (Value::Bool(x), Value::Bool(y)) => Ok(x == y),
            (x, y) => Err(self.error(
                line,
                format!(
                    "incompatible types for comparison: {} and {}",
                    x.type_name(),
                    y.type_name()
                ),
            )),
        }
    }
}

/// Spaces are added between operands when neither side is a string.
fn sprint(args: &[Value<'_>]) -> String {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 && !arg.is_string() && !args[i - 1].is_string() {
            out.push(' ');
        }
        arg.write_to(&mut out);
    }
    out
}
