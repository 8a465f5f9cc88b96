//! Call-Site Classifier
//!
//! Matches a call expression against the recognized call idioms in a fixed
//! priority order and lowers it accordingly. Classification is a pure
//! function of the call's shape; lowering lives on `Generator`.

use crate::ast::{Expression, ExpressionKind, Indexer};
use crate::codegen::{format_number, CallPosition, GenResult, GenerateError, Generator};
use crate::scope::{escape_property, LUA_SYSTEM_LIB};

/// Member names that already denote a bound function; self-dispatch through
/// them keeps the path instead of routing via `prototype`.
const DIRECT_DISPATCH_KEYS: [&str; 3] = ["super", "callFunc", "toplevel"];

// ═══════════════════════════════════════════════════════════════════════════════
// CALL SITES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStyle {
    /// `f(a, b)`
    Arguments,
    /// `f { ... }`
    Table,
    /// `f "..."`
    String,
}

/// Uniform view over the three Lua call forms.
#[derive(Debug, Clone)]
pub struct CallSite<'e> {
    pub base: &'e Expression,
    pub arguments: Vec<&'e Expression>,
    pub style: CallStyle,
}

impl<'e> CallSite<'e> {
    pub fn from_expression(expression: &'e Expression) -> Option<Self> {
        match &expression.kind {
            ExpressionKind::Call { base, arguments } => Some(Self {
                base,
                arguments: arguments.iter().collect(),
                style: CallStyle::Arguments,
            }),
            ExpressionKind::TableCall { base, argument } => Some(Self {
                base,
                arguments: vec![argument.as_ref()],
                style: CallStyle::Table,
            }),
            ExpressionKind::StringCall { base, argument } => Some(Self {
                base,
                arguments: vec![argument.as_ref()],
                style: CallStyle::String,
            }),
            _ => None,
        }
    }

    fn callee_is(&self, name: &str) -> bool {
        self.base.is_identifier(name)
    }

    /// `lib.name(...)`, or the flattened local alias `lib_name(...)`.
    fn callee_is_library(&self, library: &str, name: &str) -> bool {
        if let Some((lib, member)) = self.base.as_qualified_name() {
            return lib == library && member == name;
        }
        self.base
            .identifier_name()
            .map(|callee| {
                callee.len() == library.len() + name.len() + 1
                    && callee.starts_with(library)
                    && callee.ends_with(name)
                    && callee.as_bytes()[library.len()] == b'_'
            })
            .unwrap_or(false)
    }

    fn first_argument(&self) -> Option<&'e Expression> {
        self.arguments.first().copied()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CLASSIFICATION
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPattern {
    ClassFactory,
    SelectLength,
    SelectIndex,
    StringFormat,
    Error,
    TableInsert,
    TableInsertAt,
    TableConcat,
    Type,
    SystemFunction,
    Require,
    SelfCall,
    ValueType,
    Assert,
    Generic,
}

/// Generation context the classifier needs to see.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassifyContext<'c> {
    /// Receiver name of the enclosing method, if any.
    pub receiver: Option<&'c str>,
    pub value_types: &'c [String],
}

pub fn classify(site: &CallSite<'_>, context: &ClassifyContext<'_>) -> CallPattern {
    let argc = site.arguments.len();

    if site.callee_is("class") && argc >= 1 {
        return CallPattern::ClassFactory;
    }
    // Only `select(x, ...)` reads the function's own varargs.
    if site.callee_is("select") && argc == 2 && site.arguments[1].is_vararg() {
        if site.first_argument().and_then(|a| a.string_token()) == Some("#") {
            return CallPattern::SelectLength;
        }
        return CallPattern::SelectIndex;
    }
    if site.callee_is_library("string", "format")
        && argc > 1
        && site.first_argument().map(|a| a.is_string_literal()).unwrap_or(false)
    {
        return CallPattern::StringFormat;
    }
    if site.callee_is("error") {
        return CallPattern::Error;
    }
    if site.callee_is_library("table", "insert") {
        match argc {
            3 => return CallPattern::TableInsertAt,
            2 => return CallPattern::TableInsert,
            _ => {}
        }
    }
    if site.callee_is_library("table", "concat") && argc >= 1 {
        return CallPattern::TableConcat;
    }
    if site.callee_is("type") {
        return CallPattern::Type;
    }
    if let ExpressionKind::Member {
        base,
        indexer: Indexer::Dot,
        ..
    } = &site.base.kind
    {
        if base
            .identifier_name()
            .map(|lib| LUA_SYSTEM_LIB.contains(lib))
            .unwrap_or(false)
        {
            return CallPattern::SystemFunction;
        }
    }
    if site.callee_is("require") {
        return CallPattern::Require;
    }
    if let Some(receiver) = context.receiver {
        let dispatches_receiver = matches!(
            site.base.kind,
            ExpressionKind::Member {
                indexer: Indexer::Dot,
                ..
            }
        ) && site
            .first_argument()
            .map(|a| a.is_identifier(receiver))
            .unwrap_or(false);
        if dispatches_receiver {
            return CallPattern::SelfCall;
        }
    }
    if let Some(name) = site.base.identifier_name() {
        if context.value_types.iter().any(|v| v == name) {
            return CallPattern::ValueType;
        }
    }
    if site.callee_is("assert") {
        return CallPattern::Assert;
    }
    CallPattern::Generic
}

/// Any member of the callee chain names a direct-dispatch key.
fn has_direct_dispatch_key(callee: &Expression) -> bool {
    match &callee.kind {
        ExpressionKind::Member {
            base, identifier, ..
        } => {
            DIRECT_DISPATCH_KEYS.contains(&identifier.name.as_str()) || has_direct_dispatch_key(base)
        }
        ExpressionKind::Index { base, .. } => has_direct_dispatch_key(base),
        ExpressionKind::Identifier { name } => DIRECT_DISPATCH_KEYS.contains(&name.as_str()),
        _ => false,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOWERING
// ═══════════════════════════════════════════════════════════════════════════════

impl<'a> Generator<'a> {
    pub(crate) fn generate_call(&mut self, expression: &Expression, position: CallPosition) -> GenResult {
        let site = CallSite::from_expression(expression)
            .ok_or(GenerateError::UnsupportedNode("CallExpression"))?;

        let receiver = self.receiver.as_ref().map(|r| r.name.clone());
        let mut pattern = classify(
            &site,
            &ClassifyContext {
                receiver: receiver.as_deref(),
                value_types: &self.options.value_types,
            },
        );

        // A parameter named like a library shadows it.
        if pattern == CallPattern::SystemFunction {
            if let Some((library, _)) = site.base.as_qualified_name() {
                if self.is_parameter(library) {
                    pattern = CallPattern::Generic;
                }
            }
        }

        self.lower_call(pattern, &site, position)
    }

    fn lower_call(&mut self, pattern: CallPattern, site: &CallSite<'_>, position: CallPosition) -> GenResult {
        match pattern {
            CallPattern::ClassFactory => {
                if let Some(ExpressionKind::Table { .. }) = site.first_argument().map(|a| &a.kind) {
                    return self.lower_class(None, site);
                }
                let arguments = self.call_arguments(&site.arguments)?;
                Ok(format!("l2j.createClass({})", arguments))
            }
            CallPattern::SelectLength => Ok("varargs.length".to_string()),
            CallPattern::SelectIndex => {
                let index = site.arguments[0];
                match &index.kind {
                    ExpressionKind::Number { value, .. } => {
                        Ok(format!("varargs[{}]", format_number(value - 1.0)))
                    }
                    _ => Ok(format!("varargs[{} - 1]", self.generate_expression(index)?)),
                }
            }
            CallPattern::StringFormat => {
                self.registries.record_system_function("string", "format");
                let arguments = self.call_arguments(&site.arguments)?;
                Ok(format!("l2j.string.format({})", arguments))
            }
            CallPattern::Error => {
                let message = match site.first_argument() {
                    Some(message) => self.generate_expression(message)?,
                    None => String::new(),
                };
                Ok(match position {
                    CallPosition::Statement => format!("throw new Error({})", message),
                    CallPosition::Expression => {
                        format!("(() => {{ throw new Error({}); }})()", message)
                    }
                })
            }
            CallPattern::TableInsert | CallPattern::TableInsertAt => {
                self.registries.record_system_function("table", "insert");
                let arguments = self.call_arguments(&site.arguments)?;
                Ok(format!("l2j.table.insert({})", arguments))
            }
            CallPattern::TableConcat => {
                self.registries.record_system_function("table", "concat");
                let mut arguments = self.generate_list(&site.arguments)?;
                if arguments.len() == 1 {
                    arguments.push("\"\"".to_string());
                }
                Ok(format!("l2j.table.concat({})", arguments.join(", ")))
            }
            CallPattern::Type => {
                let arguments = self.call_arguments(&site.arguments)?;
                Ok(format!("l2j.luaType({})", arguments))
            }
            CallPattern::SystemFunction => {
                let (library, name) = site
                    .base
                    .as_qualified_name()
                    .ok_or(GenerateError::UnsupportedNode("MemberExpression"))?;
                self.registries.record_system_function(library, name);
                let callee = format!("l2j.{}.{}", library, escape_property(name));
                let arguments = self.call_arguments(&site.arguments)?;
                Ok(format!("{}({})", callee, arguments))
            }
            CallPattern::Require => {
                let arguments = self.call_arguments(&site.arguments)?;
                Ok(format!("l2j.require({})", arguments))
            }
            CallPattern::SelfCall => self.lower_self_call(site),
            CallPattern::ValueType => {
                let name = site.base.identifier_name().unwrap_or_default();
                let arguments = self.call_arguments(&site.arguments)?;
                Ok(format!(
                    "new {}.{}({})",
                    self.options.value_type_namespace, name, arguments
                ))
            }
            CallPattern::Assert => {
                let arguments = self.call_arguments(&site.arguments)?;
                Ok(format!("l2j.assert({})", arguments))
            }
            CallPattern::Generic => self.lower_generic_call(site),
        }
    }

    fn call_arguments(&mut self, arguments: &[&Expression]) -> GenResult {
        Ok(self.generate_list(arguments)?.join(", "))
    }

    fn lower_generic_call(&mut self, site: &CallSite<'_>) -> GenResult {
        let callee = self.generate_operand_base(site.base)?;
        let arguments = self.call_arguments(&site.arguments)?;
        if self.needs_explicit_call(&callee) {
            Ok(format!("{}.call({})", callee, arguments))
        } else {
            Ok(format!("{}({})", callee, arguments))
        }
    }

    fn needs_explicit_call(&self, callee: &str) -> bool {
        callee.contains("prototype")
            || self
                .options
                .add_call_keys
                .iter()
                .any(|key| callee.contains(key.as_str()))
    }

    /// `Base.method(self, ...)` inside a method body.
    fn lower_self_call(&mut self, site: &CallSite<'_>) -> GenResult {
        let ExpressionKind::Member {
            base, identifier, ..
        } = &site.base.kind
        else {
            return self.lower_generic_call(site);
        };

        let receiver_name = self.receiver.as_ref().map(|r| r.name.clone());
        let direct_global = base
            .identifier_name()
            .map(|name| self.registries.is_global_read(name) && Some(name) != receiver_name.as_deref())
            .unwrap_or(false);
        let keep_path = has_direct_dispatch_key(site.base)
            || (base.root_identifier().is_some() && base.root_identifier() == receiver_name.as_deref());

        let callee = if direct_global {
            self.generate_expression(site.base)?
        } else {
            let base_text = self.generate_operand_base(base)?;
            let method = escape_property(&identifier.name);
            if keep_path {
                format!("{}.{}", base_text, method)
            } else {
                format!("{}.prototype.{}", base_text, method)
            }
        };
        let arguments = self.call_arguments(&site.arguments)?;

        if direct_global {
            Ok(format!("{}({})", callee, arguments))
        } else {
            Ok(format!("{}.call({})", callee, arguments))
        }
    }
}
