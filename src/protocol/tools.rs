//! The extraction tool: definition, argument validation and result shape

use serde_json::{json, Value};

use super::error::ProtocolError;
use crate::classify::{PageSpec, ValidationError};
use crate::fetch::SourceDescriptor;
use crate::pipeline::{ExtractRequest, ExtractionResult};

pub const TOOL_NAME: &str = "extract-document-contents";

/// Name used by earlier clients
pub const LEGACY_TOOL_NAME: &str = "extract-pdf-contents";

pub fn is_extract_tool(name: &str) -> bool {
    name == TOOL_NAME || name == LEGACY_TOOL_NAME
}

/// `tools/list` result
pub fn tool_definitions() -> Value {
    json!({
        "tools": [{
            "name": TOOL_NAME,
            "description": "Extract text from a PDF or image, using the embedded text layer when present and OCR otherwise",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "source": {
                        "type": "string",
                        "description": "Local file path or http(s) URL of the document"
                    },
                    "pages": {
                        "type": "string",
                        "description": "Pages to extract, 1-based and comma-separated. Ranges (2-5) and negative indices (-1 is the last page) are allowed. Omit for all pages."
                    }
                },
                "required": ["source"]
            }
        }]
    })
}

/// `tools/call` params
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Option<Value>,
}

pub fn parse_tool_call(params: Option<&Value>) -> Result<ToolCall, ProtocolError> {
    let params = params
        .and_then(Value::as_object)
        .ok_or_else(|| ProtocolError::InvalidParams("tools/call params must be an object".to_string()))?;

    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolError::InvalidParams("tools/call requires a string 'name'".to_string()))?;

    Ok(ToolCall {
        name: name.to_string(),
        arguments: params.get("arguments").cloned().filter(|a| !a.is_null()),
    })
}

/// Validate the tool arguments into a pipeline request
///
/// `pdf_path` is accepted in place of `source`.
pub fn parse_extract_arguments(arguments: Option<&Value>) -> Result<ExtractRequest, ValidationError> {
    let args = match arguments {
        None => return Err(ValidationError::MissingArgument("source")),
        Some(Value::Object(args)) => args,
        Some(_) => {
            return Err(ValidationError::InvalidArgument {
                name: "arguments",
                expected: "an object",
            })
        }
    };

    let source = match args.get("source").or_else(|| args.get("pdf_path")) {
        None | Some(Value::Null) => return Err(ValidationError::MissingArgument("source")),
        Some(Value::String(s)) => s,
        Some(_) => {
            return Err(ValidationError::InvalidArgument {
                name: "source",
                expected: "a string",
            })
        }
    };

    let source = SourceDescriptor::parse(source).map_err(|_| ValidationError::InvalidArgument {
        name: "source",
        expected: "a file path or an http(s) URL",
    })?;
    let pages = PageSpec::from_value(args.get("pages"))?;

    Ok(ExtractRequest::new(source, pages))
}

/// `tools/call` success result
pub fn tool_result(result: &ExtractionResult) -> Value {
    json!({
        "content": [{ "type": "text", "text": result.text }],
        "structuredContent": {
            "text": result.text,
            "mode": result.mode,
            "pagesProcessed": result.pages_processed,
            "pageCount": result.page_count,
        },
        "isError": false
    })
}
