//! Converts pipeline tool definitions into MCP `Tool` records, building a
//! JSON-Schema `inputSchema` from the pipeline's flat parameter list.

use std::collections::BTreeMap;

use crate::types::{InputSchema, PipelineToolDef, PropertySchema, Tool};

/// Parameter types are case-insensitive; anything unrecognized defaults to
/// `string`.
fn json_schema_type(pipeline_type: &str) -> &'static str {
    match pipeline_type.to_ascii_uppercase().as_str() {
        "STRING" => "string",
        "NUMBER" => "number",
        "INTEGER" => "integer",
        "BOOLEAN" => "boolean",
        "ARRAY" => "array",
        "OBJECT" => "object",
        _ => "string",
    }
}

pub fn convert(def: PipelineToolDef) -> Tool {
    let mut properties = BTreeMap::new();
    let mut required = Vec::new();

    for param in &def.parameters {
        properties.insert(
            param.name.clone(),
            PropertySchema {
                property_type: json_schema_type(&param.param_type).to_string(),
            },
        );
        if param.required {
            required.push(param.name.clone());
        }
    }

    Tool {
        name: def.name,
        description: def.description,
        input_schema: InputSchema {
            schema_type: "object".to_string(),
            properties,
            required,
            additional_properties: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PipelineParamDef;

    #[test]
    fn maps_required_parameter_and_lowercases_type() {
        let def = PipelineToolDef {
            name: "echo".to_string(),
            description: "e".to_string(),
            parameters: vec![PipelineParamDef {
                name: "msg".to_string(),
                param_type: "STRING".to_string(),
                required: true,
            }],
        };
        let tool = convert(def);
        assert_eq!(tool.input_schema.schema_type, "object");
        assert_eq!(tool.input_schema.required, vec!["msg".to_string()]);
        assert_eq!(
            tool.input_schema.properties["msg"].property_type,
            "string"
        );
        assert!(!tool.input_schema.additional_properties);
    }

    #[test]
    fn unknown_parameter_type_defaults_to_string() {
        let def = PipelineToolDef {
            name: "t".to_string(),
            description: "".to_string(),
            parameters: vec![PipelineParamDef {
                name: "x".to_string(),
                param_type: "WEIRD".to_string(),
                required: false,
            }],
        };
        let tool = convert(def);
        assert_eq!(tool.input_schema.properties["x"].property_type, "string");
        assert!(tool.input_schema.required.is_empty());
    }
}
