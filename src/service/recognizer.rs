use crate::config::GlmConfig;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// 发票要素提取提示词, 要求模型只回 JSON
const INVOICE_PROMPT: &str = r#"请识别这张单据图片（可能是发票或费用报销单），提取以下信息并以 JSON 格式返回：
{
  "doc_type": "发票/费用报销单/收据/其他",
  "invoice_no": "发票号码或单据编号",
  "invoice_date": "日期 (YYYY-MM-DD格式)",
  "invoice_type": "增值税专票/增值税普票/电子普票/费用报销单/其他",
  "seller_name": "销方名称或供应商",
  "seller_tax_no": "销方税号",
  "amount": 金额(数字，不含税金额，如果没有税额则等于总金额),
  "tax_amount": 税额(数字，如果没有则为0),
  "total_amount": 价税合计或报销金额(数字),
  "items": ["商品/服务名称或摘要内容"],
  "payee": "领款人姓名(领款人签章处)",
  "handler": "经手人姓名(经手处)",
  "expense_category": "费用类别(交通费/差旅费-住宿/业务招待费/办公费/通讯费/固定资产/低值易耗品/其他)",
  "confidence": 置信度(0-1之间的小数，表示识别准确度)
}

注意事项：
1. 如果某个字段无法识别，请设为 null
2. 金额字段必须是纯数字，不要带单位符号（如 ¥29659.07 应返回 29659.07）
3. 日期格式必须是 YYYY-MM-DD
4. 只返回 JSON 对象，不要包含其他说明文字
5. 注意识别手写内容，仔细辨认"#;

/// 从模型回复中抓取首个 JSON 对象
static JSON_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{[\s\S]*\}").expect("invalid JSON block pattern"));

/// 识别服务错误
#[derive(Debug, Error)]
pub enum RecognizeError {
    #[error("读取图片失败: {0}")]
    Image(#[from] std::io::Error),

    #[error("GLM 请求失败: {0}")]
    Http(#[from] reqwest::Error),

    #[error("GLM 响应为空")]
    EmptyResponse,

    #[error("GLM 响应中未找到 JSON")]
    MissingJson,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    ImageUrl { image_url: ImageUrl },
    Text { text: String },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

/// GLM 视觉模型客户端
///
/// 返回的 JSON 一律视为非受信输入, 强类型化在 RecognizedInvoice::from_raw 完成。
pub struct GlmClient {
    config: GlmConfig,
    client: Client,
    call_count: AtomicU64,
    total_tokens: AtomicU64,
}

impl GlmClient {
    pub fn new(config: GlmConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        if config.api_key.is_empty() {
            tracing::warn!("GLM 未配置 API Key, 使用模拟模式");
        } else {
            tracing::info!("GLM 客户端初始化成功 | Model: {}", config.model);
        }

        Self {
            config,
            client,
            call_count: AtomicU64::new(0),
            total_tokens: AtomicU64::new(0),
        }
    }

    /// 识别发票图片, 返回模型解析出的原始 JSON
    pub async fn recognize_invoice(&self, image_path: &Path) -> Result<Value, RecognizeError> {
        let call_id = self.call_count.fetch_add(1, Ordering::Relaxed) + 1;
        let started = std::time::Instant::now();
        tracing::info!("[GLM-{:04}] 开始识别 | 图片: {}", call_id, image_path.display());

        if self.config.api_key.is_empty() {
            tracing::warn!("[GLM-{:04}] 使用模拟模式 (无 API Key)", call_id);
            return Ok(mock_response());
        }

        let image = tokio::fs::read(image_path).await?;
        tracing::debug!(
            "[GLM-{:04}] 图片大小: {:.1} KB | 调用 GLM API | Model: {}",
            call_id,
            image.len() as f64 / 1024.0,
            self.config.model
        );

        let data_url = format!(
            "data:{};base64,{}",
            mime_for(image_path),
            BASE64.encode(&image)
        );
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: data_url },
                    },
                    ContentPart::Text {
                        text: INVOICE_PROMPT.to_string(),
                    },
                ],
            }],
        };

        let response: ChatResponse = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(usage) = &response.usage {
            self.total_tokens.fetch_add(usage.total_tokens, Ordering::Relaxed);
            tracing::info!(
                "[GLM-{:04}] Token 使用: prompt={}, completion={}, total={}",
                call_id,
                usage.prompt_tokens,
                usage.completion_tokens,
                usage.total_tokens
            );
        }

        let content = response
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or(RecognizeError::EmptyResponse)?;

        match extract_json_block(content) {
            Some(parsed) => {
                tracing::info!(
                    "[GLM-{:04}] 识别成功 | 耗时: {:.2}s | 发票号: {} | 金额: {}",
                    call_id,
                    started.elapsed().as_secs_f64(),
                    parsed
                        .get("invoice_no")
                        .and_then(|v| v.as_str())
                        .unwrap_or("N/A"),
                    parsed.get("total_amount").unwrap_or(&json!(0))
                );
                Ok(parsed)
            }
            None => {
                tracing::warn!(
                    "[GLM-{:04}] 解析失败 | 耗时: {:.2}s | 原始响应: {:.200}",
                    call_id,
                    started.elapsed().as_secs_f64(),
                    content
                );
                Err(RecognizeError::MissingJson)
            }
        }
    }
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("pdf") => "application/pdf",
        _ => "image/png",
    }
}

fn extract_json_block(content: &str) -> Option<Value> {
    let found = JSON_BLOCK.find(content)?;
    serde_json::from_str(found.as_str()).ok()
}

/// 无 API Key 时的模拟数据
fn mock_response() -> Value {
    json!({
        "invoice_no": "12345678901234567890",
        "invoice_date": "2025-01-10",
        "invoice_type": "增值税普票",
        "seller_name": "测试公司",
        "seller_tax_no": "91110000MA12345678",
        "amount": 100.00,
        "tax_amount": 6.00,
        "total_amount": 106.00,
        "items": ["测试服务"],
        "confidence": 0.95
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_json_from_fenced_reply() {
        let content = "识别结果如下：\n```json\n{\"invoice_no\": \"123\", \"amount\": 10.5}\n```";
        let parsed = extract_json_block(content).unwrap();
        assert_eq!(parsed["invoice_no"], "123");
        assert_eq!(parsed["amount"], 10.5);
    }

    #[test]
    fn plain_text_reply_has_no_json() {
        assert!(extract_json_block("无法识别该图片").is_none());
        assert!(extract_json_block("{截断的 JSON").is_none());
    }

    #[test]
    fn mime_follows_extension() {
        assert_eq!(mime_for(Path::new("a.jpg")), "image/jpeg");
        assert_eq!(mime_for(Path::new("a.JPEG")), "image/jpeg");
        assert_eq!(mime_for(Path::new("a.png")), "image/png");
        assert_eq!(mime_for(Path::new("a.bin")), "image/png");
    }

    #[test]
    fn mock_payload_parses_into_recognized_invoice() {
        let rec = crate::models::RecognizedInvoice::from_raw(&mock_response());
        assert_eq!(rec.invoice_no.as_deref(), Some("12345678901234567890"));
        assert_eq!(rec.total_amount, bigdecimal::BigDecimal::from(106));
        assert_eq!(rec.confidence, 0.95);
    }
}
