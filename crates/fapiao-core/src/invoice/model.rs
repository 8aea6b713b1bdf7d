//! Model-based invoice extraction.
//!
//! The core only builds prompts and maps answers. Talking to a model service is the job of a
//! [`ModelClient`] supplied by the caller.

use serde_json::{Map, Value};
use tracing::{debug, info};

use super::rules::numerals::to_amount;
use super::rules::{parse_date, preview};
use super::{InvoiceExtractor, Result};
use crate::convert::{Conversion, EncodedImage, UnitKind};
use crate::error::{ExtractionError, ModelError};
use crate::models::config::ModelProfile;
use crate::models::record::ExtractedRecord;

/// Instruction shared by the text and vision prompts.
const INSTRUCTION: &str = "你是专业的发票信息提取助手。请从给定的发票中提取以下字段，只返回一个 JSON 对象，不要输出其他内容：
发票号码、开票日期、购方名称、销方名称、项目名称、金额、税率、税额、价税合计(小写)、开票人。
金额、税额、价税合计(小写) 使用阿拉伯数字，且 金额 + 税额 = 价税合计(小写)。无法识别的字段返回空字符串。
示例：{\"发票号码\": \"25327000000693696263\", \"开票日期\": \"2025年06月23日\", \"购方名称\": \"北京星石娱动国际传媒有限公司\", \"销方名称\": \"苏州市吉利优行电子科技有限公司\", \"项目名称\": \"*运输服务*客运服务费\", \"金额\": \"98.77\", \"税率\": \"3%\", \"税额\": \"2.96\", \"价税合计(小写)\": \"101.73\", \"开票人\": \"胡晋阳\"}";

/// Keys accepted for the tax-inclusive total, in priority order.
const TOTAL_KEYS: [&str; 3] = ["价税合计(小写)", "价税合计（小写）", "价税合计"];

/// Input attached to a model request.
#[derive(Debug, Clone)]
pub enum ModelInput<'a> {
    /// Invoice text, appended to the prompt.
    Text(&'a str),
    /// Page images, in order.
    Images(Vec<&'a EncodedImage>),
}

/// One call to a model service.
#[derive(Debug, Clone)]
pub struct ModelRequest<'a> {
    /// Model name.
    pub model: &'a str,
    /// Instruction text.
    pub prompt: &'a str,
    /// Text or images to extract from.
    pub input: ModelInput<'a>,
}

impl ModelRequest<'_> {
    /// Prompt with any text input appended.
    pub fn full_prompt(&self) -> String {
        match &self.input {
            ModelInput::Text(text) => format!("{}\n\n发票文本：\n{}", self.prompt, text),
            ModelInput::Images(_) => self.prompt.to_string(),
        }
    }

    /// Attached images, empty for text input.
    pub fn images(&self) -> &[&EncodedImage] {
        match &self.input {
            ModelInput::Images(images) => images,
            ModelInput::Text(_) => &[],
        }
    }
}

/// Access to a language or vision model.
pub trait ModelClient: Send + Sync {
    /// Send a request and return the raw answer text.
    fn generate(&self, request: &ModelRequest<'_>) -> std::result::Result<String, ModelError>;
}

impl<C: ModelClient + ?Sized> ModelClient for &C {
    fn generate(&self, request: &ModelRequest<'_>) -> std::result::Result<String, ModelError> {
        (**self).generate(request)
    }
}

impl<C: ModelClient + ?Sized> ModelClient for Box<C> {
    fn generate(&self, request: &ModelRequest<'_>) -> std::result::Result<String, ModelError> {
        (**self).generate(request)
    }
}

/// Client for setups without a model service. Every call fails with
/// [`ModelError::NotConfigured`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Unconfigured;

impl ModelClient for Unconfigured {
    fn generate(&self, _request: &ModelRequest<'_>) -> std::result::Result<String, ModelError> {
        Err(ModelError::NotConfigured)
    }
}

/// Extraction through a model client.
#[derive(Debug, Clone)]
pub struct ModelExtractor<C> {
    client: C,
    text_model: String,
    vision_model: String,
    preview_chars: usize,
}

impl<C: ModelClient> ModelExtractor<C> {
    /// Extractor using the profile's text and vision models.
    pub fn new(client: C, profile: &ModelProfile) -> Self {
        Self {
            client,
            text_model: profile.text_model.clone(),
            vision_model: profile.vision_model.clone(),
            preview_chars: 500,
        }
    }

    /// Set the number of characters of the model answer kept in `raw_text`.
    pub fn with_preview_chars(mut self, chars: usize) -> Self {
        self.preview_chars = chars;
        self
    }

    /// Extract from rendered images or degraded text pages.
    pub fn extract_conversion(&self, conversion: &Conversion) -> Result<ExtractedRecord> {
        match conversion.kind() {
            UnitKind::Text => self.extract(&conversion.text_pages().join("\n")),
            UnitKind::Image => self.extract_images(conversion.images()),
        }
    }

    /// Extract from page images with the vision model.
    pub fn extract_images(&self, images: Vec<&EncodedImage>) -> Result<ExtractedRecord> {
        if images.is_empty() {
            return Err(ExtractionError::UnsupportedInput("no images to extract from".to_string()));
        }
        info!(model = %self.vision_model, pages = images.len(), "Extracting fields from images");
        let request = ModelRequest {
            model: &self.vision_model,
            prompt: INSTRUCTION,
            input: ModelInput::Images(images),
        };
        self.run(&request)
    }

    fn run(&self, request: &ModelRequest<'_>) -> Result<ExtractedRecord> {
        let answer = self.client.generate(request)?;
        if answer.trim().is_empty() {
            return Err(ModelError::EmptyResponse.into());
        }
        let fields = parse_response(&answer)?;
        debug!(keys = fields.len(), "model answer parsed");
        Ok(record_from_fields(&fields, self.preview_chars))
    }
}

impl<C: ModelClient> InvoiceExtractor for ModelExtractor<C> {
    fn name(&self) -> &str {
        "model"
    }

    fn extract(&self, text: &str) -> Result<ExtractedRecord> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ExtractionError::EmptyText);
        }
        info!(model = %self.text_model, "Extracting fields from {} characters of text", text.chars().count());
        let request = ModelRequest {
            model: &self.text_model,
            prompt: INSTRUCTION,
            input: ModelInput::Text(text),
        };
        self.run(&request)
    }
}

/// Parse a model answer into a JSON object.
///
/// Markdown code fences are dropped and the outermost `{...}` is taken, so chatter around
/// the object is tolerated.
pub fn parse_response(answer: &str) -> Result<Map<String, Value>> {
    let trimmed = answer.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_end().trim_end_matches("```"))
        .unwrap_or(trimmed);

    let (Some(start), Some(end)) = (unfenced.find('{'), unfenced.rfind('}')) else {
        return Err(ExtractionError::InvalidResponse(preview(trimmed, 120)));
    };
    if end < start {
        return Err(ExtractionError::InvalidResponse(preview(trimmed, 120)));
    }

    match serde_json::from_str::<Value>(&unfenced[start..=end]) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(_) => Err(ExtractionError::InvalidResponse("answer is not a JSON object".to_string())),
        Err(e) => Err(ExtractionError::InvalidResponse(e.to_string())),
    }
}

/// Map model fields onto a record.
///
/// Absent or blank text fields stay absent. Amounts go through the lenient numeral
/// conversion, so a missing amount becomes zero.
pub fn record_from_fields(fields: &Map<String, Value>, preview_chars: usize) -> ExtractedRecord {
    let total = TOTAL_KEYS
        .iter()
        .find_map(|key| fields.get(*key).filter(|value| !is_blank(value)))
        .unwrap_or(&Value::Null);

    let raw_text = serde_json::to_string_pretty(fields).unwrap_or_default();

    ExtractedRecord {
        invoice_number: text_field(fields, "发票号码"),
        issue_date: text_field(fields, "开票日期").map(|raw| parse_date(&raw)),
        buyer_name: text_field(fields, "购方名称"),
        seller_name: text_field(fields, "销方名称"),
        item_name: text_field(fields, "项目名称"),
        amount: Some(to_amount(fields.get("金额").unwrap_or(&Value::Null))),
        tax_amount: Some(to_amount(fields.get("税额").unwrap_or(&Value::Null))),
        total_amount: Some(to_amount(total)),
        raw_text: preview(&raw_text, preview_chars),
        ..ExtractedRecord::default()
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn text_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    let text = match fields.get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::ImageEncoding;
    use crate::models::record::InvoiceDate;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use std::sync::Mutex;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    /// Replays a fixed answer and remembers the requests it saw.
    struct FakeClient {
        answer: std::result::Result<String, ()>,
        seen: Mutex<Vec<(String, String, usize)>>,
    }

    impl FakeClient {
        fn answering(answer: &str) -> Self {
            Self {
                answer: Ok(answer.to_string()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                answer: Err(()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl ModelClient for FakeClient {
        fn generate(&self, request: &ModelRequest<'_>) -> std::result::Result<String, ModelError> {
            self.seen.lock().unwrap().push((
                request.model.to_string(),
                request.full_prompt(),
                request.images().len(),
            ));
            self.answer
                .clone()
                .map_err(|_| ModelError::Request("connection refused".to_string()))
        }
    }

    const ANSWER: &str = r#"```json
{
  "发票号码": "25327000000693696263",
  "开票日期": "2025年06月23日",
  "购方名称": "北京星石娱动国际传媒有限公司",
  "销方名称": "苏州市吉利优行电子科技有限公司",
  "项目名称": "*运输服务*客运服务费",
  "金额": "98.77",
  "税率": "3%",
  "税额": 2.96,
  "价税合计(小写)": "101.73",
  "开票人": "胡晋阳"
}
```"#;

    fn image() -> EncodedImage {
        EncodedImage {
            data: vec![1, 2, 3],
            encoding: ImageEncoding::Png,
            width: 1,
            height: 1,
        }
    }

    #[test]
    fn test_text_extraction() {
        let client = FakeClient::answering(ANSWER);
        let extractor = ModelExtractor::new(&client, &ModelProfile::default());
        let record = extractor.extract("发票文本内容").unwrap();

        assert_eq!(record.invoice_number.as_deref(), Some("25327000000693696263"));
        assert_eq!(
            record.issue_date,
            Some(InvoiceDate::Date(NaiveDate::from_ymd_opt(2025, 6, 23).unwrap()))
        );
        assert_eq!(record.seller_name.as_deref(), Some("苏州市吉利优行电子科技有限公司"));
        assert_eq!(record.amount, Some(dec("98.77")));
        assert_eq!(record.tax_amount, Some(dec("2.96")));
        assert_eq!(record.total_amount, Some(dec("101.73")));
        assert!(record.raw_text.contains("开票人"));

        let seen = client.seen.lock().unwrap();
        assert_eq!(seen[0].0, ModelProfile::default().text_model);
        assert!(seen[0].1.ends_with("发票文本内容"));
        assert_eq!(seen[0].2, 0);
    }

    #[test]
    fn test_conversion_routing() {
        let client = FakeClient::answering(ANSWER);
        let extractor = ModelExtractor::new(&client, &ModelProfile::default());

        let images = Conversion::from_images(vec![image(), image()], Vec::new()).unwrap();
        extractor.extract_conversion(&images).unwrap();

        let pages =
            Conversion::from_text_pages(vec!["第一页".to_string(), "第二页".to_string()], Vec::new())
                .unwrap();
        extractor.extract_conversion(&pages).unwrap();

        let seen = client.seen.lock().unwrap();
        assert_eq!(seen[0].0, ModelProfile::default().vision_model);
        assert_eq!(seen[0].2, 2);
        assert_eq!(seen[1].0, ModelProfile::default().text_model);
        assert!(seen[1].1.ends_with("第一页\n第二页"));
    }

    #[test]
    fn test_missing_amounts_default_to_zero() {
        let record = record_from_fields(
            &parse_response(r#"{"发票号码": "", "价税合计（小写）": "壹佰圆整"}"#).unwrap(),
            500,
        );
        assert_eq!(record.invoice_number, None);
        assert_eq!(record.amount, Some(Decimal::ZERO));
        assert_eq!(record.tax_amount, Some(Decimal::ZERO));
        assert_eq!(record.total_amount, Some(dec("100")));
    }

    #[test]
    fn test_blank_total_key_falls_through() {
        let record = record_from_fields(
            &parse_response(r#"{"价税合计(小写)": " ", "价税合计（小写）": null, "价税合计": "101.73"}"#)
                .unwrap(),
            500,
        );
        assert_eq!(record.total_amount, Some(dec("101.73")));
    }

    #[test]
    fn test_parse_response_tolerates_chatter() {
        let fields = parse_response("好的，结果如下：{\"金额\": \"1.00\"} 希望有帮助").unwrap();
        assert_eq!(fields["金额"], "1.00");
        assert!(parse_response("```\n{\"a\": 1}\n```").is_ok());
    }

    #[test]
    fn test_parse_response_rejects_non_objects() {
        assert!(matches!(
            parse_response("无法识别"),
            Err(ExtractionError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_response("} {"),
            Err(ExtractionError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_response("{not json}"),
            Err(ExtractionError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_client_failure_becomes_failed_record() {
        let extractor = ModelExtractor::new(FakeClient::failing(), &ModelProfile::default());
        let record = extractor.safe_extract("a.pdf", "text");
        assert!(record.is_failed());
        assert!(record.error_reason.unwrap().contains("connection refused"));
    }

    #[test]
    fn test_unconfigured_and_empty_answers() {
        let extractor = ModelExtractor::new(Unconfigured, &ModelProfile::default());
        assert!(matches!(
            extractor.extract("text"),
            Err(ExtractionError::Model(ModelError::NotConfigured))
        ));

        let extractor = ModelExtractor::new(FakeClient::answering("  "), &ModelProfile::default());
        assert!(matches!(
            extractor.extract("text"),
            Err(ExtractionError::Model(ModelError::EmptyResponse))
        ));
        assert!(matches!(extractor.extract(""), Err(ExtractionError::EmptyText)));
    }
}
