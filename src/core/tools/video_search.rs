//! `search_videos`: asks the client application to search for and play a
//! video. Nothing is fetched here; the result is an intent the client acts
//! on, delivered to it directly.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use super::base::{Tool, ToolError, ToolResult};

/// Services the client knows how to open.
pub const VIDEO_SERVICES: [&str; 2] = ["videocenter", "youtube"];

/// Result type tag read by clients.
pub const VIDEO_SEARCH_RESULT_TYPE: &str = "tools.search_videos";

#[derive(Debug, Deserialize)]
struct VideoSearchArgs {
    service: String,
    input: String,
}

/// `search_videos`
#[derive(Debug, Default)]
pub struct VideoSearchTool;

impl VideoSearchTool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for VideoSearchTool {
    fn name(&self) -> &str {
        "search_videos"
    }

    fn description(&self) -> &str {
        "Search for and play videos on a service. Use 'videocenter' for movies and TV shows, 'youtube' for general video content."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "service": {
                    "type": "string",
                    "enum": VIDEO_SERVICES,
                    "description": "\"videocenter\" for movies and TV shows, \"youtube\" for tutorials, music and other videos"
                },
                "input": {
                    "type": "string",
                    "description": "Search string for the video"
                }
            },
            "required": ["service", "input"]
        })
    }

    async fn invoke(&self, arguments: Value) -> ToolResult<Value> {
        let args: VideoSearchArgs = serde_json::from_value(arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        let service = args.service.trim().to_lowercase();
        if !VIDEO_SERVICES.contains(&service.as_str()) {
            return Err(ToolError::InvalidArguments(format!(
                "Unsupported service: {service}. Supported services: {}",
                VIDEO_SERVICES.join(", ")
            )));
        }
        let input = args.input.trim();
        if input.is_empty() {
            return Err(ToolError::InvalidArguments("input must not be empty".to_string()));
        }

        info!(service = %service, input = %input, "Video search requested");
        Ok(json!({
            "type": VIDEO_SEARCH_RESULT_TYPE,
            "description": "The client application should open a web browser and search for the query given in intent.",
            "return_direct": true,
            "intent": {
                "webbrowser": {
                    "search_videos": {
                        "service": service,
                        "input": input,
                    }
                }
            }
        }))
    }
}
