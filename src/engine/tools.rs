// Zenith Agent Engine — Tool definitions
// The fixed six-tool schema advertised to the model. Descriptions matter:
// they are the only documentation the model gets.

use crate::engine::types::{FunctionDefinition, ToolDefinition};
use serde_json::json;

impl ToolDefinition {
    pub fn read_files() -> Self {
        ToolDefinition {
            tool_type: "function".into(),
            function: FunctionDefinition {
                name: "read_files".into(),
                description: "Read the full content of the current project files (index.html, styles.css, script.js). Use this to inspect the code.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {},
                    "required": []
                }),
            },
        }
    }

    pub fn update_file() -> Self {
        ToolDefinition {
            tool_type: "function".into(),
            function: FunctionDefinition {
                name: "update_file".into(),
                description: "Completely replace the content of a single file".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "target": {
                            "type": "string",
                            "enum": ["html", "css", "javascript"],
                            "description": "The file to update"
                        },
                        "content": {
                            "type": "string",
                            "description": "The full new content of the file"
                        }
                    },
                    "required": ["target", "content"]
                }),
            },
        }
    }

    pub fn patch_file() -> Self {
        ToolDefinition {
            tool_type: "function".into(),
            function: FunctionDefinition {
                name: "patch_file".into(),
                description: "Replace a specific segment of code within a file. Only the first occurrence of the search string is replaced, so make it unique.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "target": {
                            "type": "string",
                            "enum": ["html", "css", "javascript"],
                            "description": "The file to patch"
                        },
                        "search_string": {
                            "type": "string",
                            "description": "The exact code segment to find and replace"
                        },
                        "replacement_string": {
                            "type": "string",
                            "description": "The new code to insert in place of the search string"
                        }
                    },
                    "required": ["target", "search_string", "replacement_string"]
                }),
            },
        }
    }

    pub fn screenshot_website() -> Self {
        ToolDefinition {
            tool_type: "function".into(),
            function: FunctionDefinition {
                name: "screenshot_website".into(),
                description: "Take a visual screenshot of the current rendered website project to analyze the UI.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {},
                    "required": []
                }),
            },
        }
    }

    pub fn validate_functionality() -> Self {
        ToolDefinition {
            tool_type: "function".into(),
            function: FunctionDefinition {
                name: "validate_functionality".into(),
                description: "Execute a JavaScript test script against the current website to verify functionality. The script runs inside the page; throw an Error to fail the test.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "test_script": {
                            "type": "string",
                            "description": "JavaScript code that asserts conditions. Throw an Error if the test fails."
                        }
                    },
                    "required": ["test_script"]
                }),
            },
        }
    }

    pub fn read_console_logs() -> Self {
        ToolDefinition {
            tool_type: "function".into(),
            function: FunctionDefinition {
                name: "read_console_logs".into(),
                description: "Read the browser console logs captured from the live preview. Check these first when the user reports an error.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {},
                    "required": []
                }),
            },
        }
    }

    /// The full built-in tool set, in the order it is advertised.
    pub fn builtins() -> Vec<Self> {
        vec![
            Self::read_files(),
            Self::update_file(),
            Self::patch_file(),
            Self::screenshot_website(),
            Self::validate_functionality(),
            Self::read_console_logs(),
        ]
    }
}
