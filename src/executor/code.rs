//! Embedded interpreters for parser code.
//!
//! Parser code defines a function taking the parsed response body and returning
//! the extracted value. A function named `parse` is preferred, otherwise the
//! first function defined in the code is called.

use std::{sync::LazyLock, time::Instant};

use regex::Regex;
use rquickjs::{Context as JsContext, FromJs, Runtime as JsRuntime};
use rustpython_vm::{
    AsObject, Interpreter, PyObjectRef, PyResult, VirtualMachine,
    builtins::{PyBaseExceptionRef, PyDict, PyFloat, PyInt, PyList, PyStr, PyTuple},
    signal::{UserSignal, UserSignalReceiver},
};
use serde_json::Value;

use crate::{Result, ScrapeError};

const PREFERRED_FUNCTION: &str = "parse";

static JS_FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"function\s+([a-zA-Z_$][a-zA-Z0-9_$]*)\s*\(").unwrap());
static PY_FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*def\s+([a-zA-Z_][a-zA-Z0-9_]*)\s*\(").unwrap());

fn pick_function(
    re: &Regex,
    code: &str,
) -> Option<String> {
    let names: Vec<&str> = re.captures_iter(code).filter_map(|caps| caps.get(1)).map(|m| m.as_str()).collect();
    names.iter().find(|n| **n == PREFERRED_FUNCTION).or(names.first()).map(|n| n.to_string())
}

pub struct JavascriptExecutor;

impl JavascriptExecutor {
    /// Run `code` with `data` as the single argument of its parser function.
    ///
    /// Evaluation is interrupted once `deadline` passes, and the QuickJS heap is
    /// capped at `memory_limit` bytes (0 leaves it unbounded).
    pub fn execute(
        code: &str,
        data: Value,
        deadline: Instant,
        memory_limit: usize,
    ) -> Result<Value> {
        let func_name = pick_function(&JS_FUNCTION_RE, code).ok_or_else(|| ScrapeError::ParserError("no function defined in parser code".to_string()))?;

        let runtime = JsRuntime::new().map_err(|e| ScrapeError::ParserError(e.to_string()))?;
        if memory_limit > 0 {
            runtime.set_memory_limit(memory_limit);
        }
        runtime.set_interrupt_handler(Some(Box::new(move || Instant::now() >= deadline)));
        let ctx = JsContext::full(&runtime).map_err(|e| ScrapeError::ParserError(e.to_string()))?;

        ctx.with(|ctx| {
            if let Err(rquickjs::Error::Exception) = ctx.eval::<(), _>(code) {
                return Err(ScrapeError::ParserError(Self::caught(&ctx)));
            }

            let data_json = serde_json::to_string(&data)?;
            let call_code = format!("JSON.stringify({}({}))", func_name, data_json);

            let result: std::result::Result<Option<String>, _> = ctx.eval(call_code);
            match result {
                Ok(Some(json_str)) => serde_json::from_str(&json_str).map_err(|e| ScrapeError::ParserError(e.to_string())),
                // JSON.stringify(undefined)
                Ok(None) => Ok(Value::Null),
                Err(rquickjs::Error::Exception) => Err(ScrapeError::ParserError(Self::caught(&ctx))),
                Err(e) => Err(ScrapeError::ParserError(e.to_string())),
            }
        })
    }

    /// The pending exception as `Name: message`.
    fn caught(ctx: &rquickjs::Ctx<'_>) -> String {
        let value = ctx.catch();
        if let Some(obj) = value.as_object() {
            let name = obj.get::<_, String>("name").unwrap_or_else(|_| "Error".to_string());
            let message = obj.get::<_, String>("message").unwrap_or_default();
            return format!("{}: {}", name, message);
        }
        let message = String::from_js(ctx, value).unwrap_or_default();
        format!("Error: {}", message)
    }
}

pub struct PythonExecutor;

impl PythonExecutor {
    /// Run `code` with `data` as the single argument of its parser function.
    pub fn execute(
        code: &str,
        data: Value,
    ) -> Result<Value> {
        Self::run(code, data, None)
    }

    /// Like [`PythonExecutor::execute`], but the run can be stopped by sending
    /// [`PythonExecutor::interrupt`] through the sender paired with `signals`.
    pub fn execute_interruptible(
        code: &str,
        data: Value,
        signals: UserSignalReceiver,
    ) -> Result<Value> {
        Self::run(code, data, Some(signals))
    }

    /// Raises `TimeoutError` at the next instruction of the receiving interpreter.
    pub fn interrupt() -> UserSignal {
        Box::new(|vm: &VirtualMachine| -> PyResult<()> { Err(vm.new_exception_msg(vm.ctx.exceptions.timeout_error.to_owned(), "parser code exceeded its deadline".to_owned())) })
    }

    fn run(
        code: &str,
        data: Value,
        signals: Option<UserSignalReceiver>,
    ) -> Result<Value> {
        let func_name = pick_function(&PY_FUNCTION_RE, code).ok_or_else(|| ScrapeError::ParserError("parser code must define a parse(data) function".to_string()))?;

        let interpreter = Interpreter::with_init(Default::default(), |vm| {
            if let Some(signals) = signals {
                vm.set_user_signal_channel(signals);
            }
        });
        interpreter.enter(|vm| {
            let scope = vm.new_scope_with_builtins();

            let code_obj = vm
                .compile(code, rustpython_vm::compiler::Mode::Exec, "<parser>".to_owned())
                .map_err(|e| ScrapeError::ParserError(format!("SyntaxError: {}", e)))?;

            vm.run_code_obj(code_obj, scope.clone()).map_err(|e| ScrapeError::ParserError(Self::describe(vm, &e)))?;

            let func = scope.globals.get_item(&func_name, vm).map_err(|e| ScrapeError::ParserError(Self::describe(vm, &e)))?;

            let py_data = Self::json_to_pyobject(vm, &data);
            let result = func.call((py_data,), vm).map_err(|e| ScrapeError::ParserError(Self::describe(vm, &e)))?;

            Self::pyobject_to_json(vm, &result)
        })
    }

    /// `ExceptionType: message`, without the traceback.
    fn describe(
        vm: &VirtualMachine,
        exc: &PyBaseExceptionRef,
    ) -> String {
        let name = exc.as_object().class().name().to_owned();
        let message = exc.as_object().str(vm).map(|s| s.as_str().to_string()).unwrap_or_default();
        if message.is_empty() {
            name
        } else {
            format!("{}: {}", name, message)
        }
    }

    fn json_to_pyobject(
        vm: &VirtualMachine,
        value: &Value,
    ) -> PyObjectRef {
        match value {
            Value::Null => vm.ctx.none(),
            Value::Bool(b) => vm.ctx.new_bool(*b).into(),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    vm.ctx.new_int(i).into()
                } else if let Some(f) = n.as_f64() {
                    vm.ctx.new_float(f).into()
                } else {
                    vm.ctx.none()
                }
            }
            Value::String(s) => vm.ctx.new_str(s.as_str()).into(),
            Value::Array(arr) => {
                let py_list: Vec<PyObjectRef> = arr.iter().map(|v| Self::json_to_pyobject(vm, v)).collect();
                vm.ctx.new_list(py_list).into()
            }
            Value::Object(obj) => {
                let py_dict = vm.ctx.new_dict();
                for (k, v) in obj {
                    // setting a str key on a fresh dict cannot fail
                    let _ = py_dict.set_item(k.as_str(), Self::json_to_pyobject(vm, v), vm);
                }
                py_dict.into()
            }
        }
    }

    fn pyobject_to_json(
        vm: &VirtualMachine,
        obj: &PyObjectRef,
    ) -> Result<Value> {
        if vm.is_none(obj) {
            return Ok(Value::Null);
        }

        // bool is a subclass of int
        if obj.fast_isinstance(vm.ctx.types.bool_type) {
            return Ok(Value::Bool(obj.is(&vm.ctx.true_value)));
        }

        if let Some(i) = obj.payload::<PyInt>() {
            if let Ok(n) = i.try_to_primitive::<i64>(vm) {
                return Ok(Value::Number(n.into()));
            }
        }

        if let Some(f) = obj.payload::<PyFloat>() {
            if let Some(n) = serde_json::Number::from_f64(f.to_f64()) {
                return Ok(Value::Number(n));
            }
        }

        if let Some(s) = obj.payload::<PyStr>() {
            return Ok(Value::String(s.as_str().to_string()));
        }

        if let Some(list) = obj.payload::<PyList>() {
            let mut arr = Vec::new();
            for item in list.borrow_vec().iter() {
                arr.push(Self::pyobject_to_json(vm, item)?);
            }
            return Ok(Value::Array(arr));
        }

        if let Some(tuple) = obj.payload::<PyTuple>() {
            let arr: Result<Vec<Value>> = tuple.as_slice().iter().map(|item| Self::pyobject_to_json(vm, item)).collect();
            return Ok(Value::Array(arr?));
        }

        if let Some(dict) = obj.payload::<PyDict>() {
            let mut map = serde_json::Map::new();
            for (k, v) in dict {
                let key_str = k.payload::<PyStr>().map(|s| s.as_str().to_string()).unwrap_or_else(|| format!("{:?}", k));
                map.insert(key_str, Self::pyobject_to_json(vm, &v)?);
            }
            return Ok(Value::Object(map));
        }

        Ok(Value::String(format!("{:?}", obj)))
    }
}
