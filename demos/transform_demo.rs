// Compile a small lab-result mapping and run it over a sample message.
//
//   cargo run --example transform_demo

use std::sync::Arc;

use harmonize::ast::Unit;
use harmonize::{compile, Error, Evaluator, Options, Program, Registry, Token};

const UNIT: &str = r#"{
    "name": "LabReport",
    "params": ["msg"],
    "body": [
        {"assign": {"target": {"field": "resourceType"}, "value": {"const": "DiagnosticReport"}}},
        {"assign": {"target": {"field": "id"},
                    "value": {"call": {"name": "$Hash", "args": [{"path": "msg.accession"}]}}}},
        {"assign": {"target": {"field": "issued"},
                    "value": {"call": {"name": "$ParseTime",
                                       "args": [{"const": "%Y%m%d%H%M"}, {"path": "msg.reported"}]}}}},
        {"assign": {"target": {"field": "result[]"},
                    "value": {"call": {"name": "Observation", "args": [{"path": "msg.results[]"}]}}}},
        {"assign": {"target": {"field": "conclusion"},
                    "value": {"call": {"name": "$StrFmt",
                                       "args": [{"const": "%d results"},
                                                {"call": {"name": "$ListLen", "args": [{"dest": "result"}]}}]}}}},
        {"if": {"condition": {"path": "msg.flags.abnormal"},
                "then": [{"assign": {"target": {"object": "Alerts"}, "value": {"path": "msg.accession"}}}]}}
    ],
    "projectors": [
        {"name": "Observation", "params": ["r"], "body": [
            {"assign": {"target": {"field": "code"},
                        "value": {"call": {"name": "$ToLower", "args": [{"path": "r.code"}]}}}},
            {"assign": {"target": {"field": "value"},
                        "value": {"call": {"name": "$ParseFloat", "args": [{"path": "r.value"}]}}}},
            {"assign": {"target": {"field": "unit"}, "value": {"path": "r.unit"}}}
        ]}
    ]
}"#;

const MESSAGE: &str = r#"{
    "accession": "A-1001",
    "reported": "202403151230",
    "results": [
        {"code": "GLU", "value": "5.4", "unit": "mmol/L"},
        {"code": "HBA1C", "value": "48", "unit": "mmol/mol"}
    ],
    "flags": {"abnormal": true}
}"#;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let options = Options::default();
    let mut registry = Registry::with_options(&options).map_err(Error::from)?;
    let mut program = Program::new();

    let unit = Unit::from_json_str(UNIT)?;
    compile(&unit, &mut registry, &mut program).map_err(Error::from)?;

    let evaluator = Evaluator::with_options(Arc::new(registry), Arc::new(program), options);
    let input = Token::from_json_str(MESSAGE)?;
    let output = evaluator.execute("LabReport", &input).map_err(Error::from)?;

    println!("{}", output.to_json_string_pretty()?);
    Ok(())
}
