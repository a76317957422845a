use async_trait::async_trait;
use rowcore::{Output, Tool, ToolContext, ToolError, Value};
use rowruntime::{ToolFactory, ToolMetadata};
use std::collections::HashMap;

/// HTTP fetch tool
pub struct HttpFetchTool {
    client: reqwest::Client,
}

impl HttpFetchTool {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for HttpFetchTool {
    fn tool_type(&self) -> &str {
        "http.fetch"
    }

    async fn execute(&self, ctx: ToolContext) -> Result<Output, ToolError> {
        let url = ctx
            .require_input("url")?
            .as_str()
            .ok_or_else(|| ToolError::InvalidInputType {
                field: "url".to_string(),
                expected: "string".to_string(),
                actual: ctx.inputs["url"].kind_name().to_string(),
            })?;
        let method_value = ctx.get_config_or("method", Value::String("GET".to_string()));
        let method = method_value.as_str().unwrap_or("GET");

        tracing::info!(node = %ctx.node, "{} {}", method, url);

        let request = match method.to_uppercase().as_str() {
            "GET" => self.client.get(url),
            "POST" => {
                let mut req = self.client.post(url);
                if let Some(body) = ctx.inputs.get("body") {
                    if let Some(json) = body.as_json() {
                        req = req.json(json);
                    } else if let Some(text) = body.as_str() {
                        req = req.body(text.to_string());
                    }
                }
                req
            }
            "DELETE" => self.client.delete(url),
            _ => {
                return Err(ToolError::Configuration(format!(
                    "Unsupported method: {}",
                    method
                )))
            }
        };

        // Add headers if provided
        let mut request = if let Some(Value::Object(headers)) = ctx.config.get("headers") {
            let mut req = request;
            for (key, value) in headers {
                if let Some(val_str) = value.as_str() {
                    req = req.header(key, val_str);
                }
            }
            req
        } else {
            request
        };

        // A resolved connection supplies the bearer token; its secret never
        // reaches logs or records.
        if let Some(connection) = ctx
            .connections
            .get("connection")
            .and_then(|v| v.as_connection())
        {
            if let Some(token) = connection.secret("token") {
                request = request.bearer_auth(token);
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("HTTP request failed: {}", e)))?;

        let status = response.status().as_u16();
        let headers_map: HashMap<String, Value> = response
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.to_string(),
                    Value::String(v.to_str().unwrap_or("").to_string()),
                )
            })
            .collect();

        let body_text = response
            .text()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("Failed to read response: {}", e)))?;

        tracing::debug!(node = %ctx.node, "Response status: {}", status);

        let mut outputs = HashMap::new();
        outputs.insert("status".to_string(), Value::Number(status as f64));
        outputs.insert("body".to_string(), Value::String(body_text));
        outputs.insert("headers".to_string(), Value::Object(headers_map));
        Ok(Output::Value(Value::Object(outputs)))
    }
}

pub struct HttpFetchToolFactory;

impl ToolFactory for HttpFetchToolFactory {
    fn create(&self, _config: &HashMap<String, Value>) -> Result<Box<dyn Tool>, ToolError> {
        Ok(Box::new(HttpFetchTool::new()))
    }

    fn tool_type(&self) -> &str {
        "http.fetch"
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            description: "Make HTTP requests".to_string(),
            category: "http".to_string(),
            inputs: vec![],
            outputs: vec![],
        }
    }
}
