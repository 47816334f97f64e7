// Python bindings (feature `python`)
//
// ```python
// import harmonize
//
// program = harmonize.compile(unit_json)
// out = program.execute("Patient", {"names": ["ann"]})
// ```

use std::sync::Arc;

use pyo3::exceptions::{PyTypeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

use crate::ast::Unit;
use crate::value::{Container, Token};
use crate::{compile as compile_unit, EngineError, Evaluator, Options, Program, Registry};

/// A compiled set of mapping units, ready to execute.
#[pyclass(name = "Program", frozen)]
struct PyProgram {
    evaluator: Evaluator,
}

#[pymethods]
impl PyProgram {
    /// Run the top-level mapping `name` against a Python object.
    ///
    /// # Errors
    ///
    /// Returns ValueError if execution fails
    fn execute(&self, py: Python, name: &str, data: PyObject) -> PyResult<PyObject> {
        let input = python_to_token(py, &data)?;
        let output = self
            .evaluator
            .execute(name, &input)
            .map_err(engine_error_to_py)?;
        token_to_python(py, &output)
    }

    /// Like `execute`, with JSON strings in and out (no Python object
    /// conversion).
    fn execute_json(&self, name: &str, json_str: &str) -> PyResult<String> {
        let input = Token::from_json_str(json_str)
            .map_err(|e| PyValueError::new_err(format!("Invalid JSON: {}", e)))?;
        let output = self
            .evaluator
            .execute(name, &input)
            .map_err(engine_error_to_py)?;
        output
            .to_json_string()
            .map_err(|e| PyValueError::new_err(format!("Failed to serialize result: {}", e)))
    }

    /// Names of the compiled top-level mappings.
    fn mappings(&self) -> Vec<String> {
        self.evaluator
            .program()
            .names()
            .into_iter()
            .map(String::from)
            .collect()
    }
}

/// Compile one unit (a JSON object) or several (a JSON array of objects).
///
/// # Errors
///
/// Returns ValueError if the JSON is malformed or a unit fails to compile
#[pyfunction]
#[pyo3(signature = (unit_json, options_json=None))]
fn compile(unit_json: &str, options_json: Option<&str>) -> PyResult<PyProgram> {
    let options = match options_json {
        Some(s) => Options::from_json_str(s)
            .map_err(|e| PyValueError::new_err(format!("Invalid options: {}", e)))?,
        None => Options::default(),
    };
    let units: Vec<Unit> = match serde_json::from_str::<Vec<Unit>>(unit_json) {
        Ok(units) => units,
        Err(_) => vec![Unit::from_json_str(unit_json)
            .map_err(|e| PyValueError::new_err(format!("Invalid unit: {}", e)))?],
    };

    let mut registry = Registry::with_options(&options).map_err(engine_error_to_py)?;
    let mut program = Program::new();
    for unit in &units {
        compile_unit(unit, &mut registry, &mut program)
            .map_err(|e| PyValueError::new_err(format!("Compile error: {}", e)))?;
    }

    Ok(PyProgram {
        evaluator: Evaluator::with_options(Arc::new(registry), Arc::new(program), options),
    })
}

/// Convert a Python object to a Token
///
/// - None -> Null
/// - bool -> Bool
/// - int, float -> Number
/// - str -> String
/// - list -> Array
/// - dict -> Container
fn python_to_token(py: Python, obj: &PyObject) -> PyResult<Token> {
    if obj.is_none(py) {
        return Ok(Token::Null);
    }

    let bound = obj.bind(py);
    // bool before int: bool is a subclass of int in Python
    if let Ok(b) = bound.extract::<bool>() {
        return Ok(Token::Bool(b));
    }
    if let Ok(i) = bound.extract::<i64>() {
        return Ok(Token::from(i));
    }
    if let Ok(f) = bound.extract::<f64>() {
        return Ok(Token::from(f));
    }
    if let Ok(s) = bound.extract::<String>() {
        return Ok(Token::from(s));
    }
    if let Ok(list) = bound.downcast::<PyList>() {
        let mut result = Vec::with_capacity(list.len());
        for item in list.iter() {
            result.push(python_to_token(py, &item.unbind())?);
        }
        return Ok(Token::array(result));
    }
    if let Ok(dict) = bound.downcast::<PyDict>() {
        let mut result = Container::with_capacity(dict.len());
        for (key, value) in dict.iter() {
            let key = key.extract::<String>()?;
            result.insert(key, python_to_token(py, &value.unbind())?);
        }
        return Ok(Token::container(result));
    }

    Err(PyTypeError::new_err(format!(
        "Cannot convert Python object to a token: {}",
        bound.get_type().name()?
    )))
}

/// Convert a Token to a Python object; integral numbers become `int`.
fn token_to_python(py: Python, token: &Token) -> PyResult<PyObject> {
    match token {
        Token::Null => Ok(py.None()),
        Token::Bool(b) => Ok(b.to_object(py)),
        Token::Number(n) => {
            if n.fract() == 0.0 && n.abs() < 9.0e15 {
                Ok((*n as i64).to_object(py))
            } else {
                Ok(n.to_object(py))
            }
        }
        Token::String(s) => Ok(s.as_ref().to_object(py)),
        Token::Array(arr) => {
            let list = PyList::empty(py);
            for item in arr.iter() {
                list.append(token_to_python(py, item)?)?;
            }
            Ok(list.unbind().into())
        }
        Token::Container(map) => {
            let dict = PyDict::new(py);
            for (key, value) in map.iter() {
                dict.set_item(key, token_to_python(py, value)?)?;
            }
            Ok(dict.unbind().into())
        }
    }
}

fn engine_error_to_py(e: EngineError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

/// harmonize Python module
#[pymodule]
fn _harmonize(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(compile, m)?)?;
    m.add_class::<PyProgram>()?;
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    Ok(())
}
