use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

/// 支持的发票日期格式
const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%Y年%m月%d日", "%Y.%m.%d"];

/// 解析自由格式的日期文本, 解析失败返回 None
pub fn parse_invoice_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

/// 识别结果 (模型返回的非受信 JSON 经防御性解析后的强类型字段)
///
/// 所有字段均可缺失; 数值字段允许以字符串形式出现, 强转失败按缺失处理。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecognizedInvoice {
    pub invoice_no: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub invoice_type: Option<String>,
    pub seller_name: Option<String>,
    pub seller_tax_no: Option<String>,
    pub amount: BigDecimal,
    pub tax_amount: BigDecimal,
    pub total_amount: BigDecimal,
    pub expense_category: Option<String>,
    pub handler: Option<String>,
    pub payee: Option<String>,
    pub reimbursement_person: Option<String>,
    pub confidence: f64,
    pub items: Vec<String>,
}

impl RecognizedInvoice {
    /// 从模型原始 JSON 构建, 所有 "字段缺失/类型错误" 的处理集中在这里
    pub fn from_raw(raw: &Value) -> Self {
        let amount = raw_decimal(raw, "amount").unwrap_or_else(BigDecimal::zero);
        let tax_amount = raw_decimal(raw, "tax_amount").unwrap_or_else(BigDecimal::zero);
        // 价税合计缺失时默认为 金额 + 税额
        let total_amount =
            raw_decimal(raw, "total_amount").unwrap_or_else(|| &amount + &tax_amount);

        Self {
            invoice_no: raw_str(raw, "invoice_no"),
            invoice_date: raw_str(raw, "invoice_date")
                .and_then(|s| parse_invoice_date(&s)),
            invoice_type: raw_str(raw, "invoice_type").or_else(|| raw_str(raw, "doc_type")),
            seller_name: raw_str(raw, "seller_name"),
            seller_tax_no: raw_str(raw, "seller_tax_no"),
            amount,
            tax_amount,
            total_amount,
            expense_category: raw_str(raw, "expense_category"),
            handler: raw_str(raw, "handler"),
            payee: raw_str(raw, "payee"),
            reimbursement_person: raw_str(raw, "reimbursement_person"),
            confidence: raw_f64(raw, "confidence").unwrap_or(0.5).clamp(0.0, 1.0),
            items: raw
                .get("items")
                .and_then(Value::as_array)
                .map(|arr| {
                    arr.iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    /// 报销人优先级: 经手人 > 领款人 > 识别字段 > 调用方传入
    pub fn resolved_person(&self, fallback: Option<&str>) -> Option<String> {
        self.handler
            .clone()
            .or_else(|| self.payee.clone())
            .or_else(|| self.reimbursement_person.clone())
            .or_else(|| fallback.map(str::to_string))
    }
}

fn raw_str(raw: &Value, key: &str) -> Option<String> {
    raw.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// 金额字段强转: 接受数字或字符串, 字符串剔除货币符号/千分位后解析; 负数按缺失处理
fn raw_decimal(raw: &Value, key: &str) -> Option<BigDecimal> {
    let parsed = match raw.get(key)? {
        Value::Number(n) => BigDecimal::from_str(&n.to_string()).ok(),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            if cleaned.is_empty() {
                None
            } else {
                BigDecimal::from_str(&cleaned).ok()
            }
        }
        _ => None,
    };
    parsed.filter(|v| *v >= BigDecimal::zero())
}

fn raw_f64(raw: &Value, key: &str) -> Option<f64> {
    match raw.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// 发票记录 (invoices 表)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub id: Uuid,
    pub invoice_no: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub invoice_type: Option<String>,
    pub seller_name: Option<String>,
    pub seller_tax_no: Option<String>,
    pub amount: BigDecimal,
    pub tax_amount: BigDecimal,
    pub total_amount: BigDecimal,
    pub expense_category: Option<String>,
    pub reimbursement_person: Option<String>,
    pub confidence: f64,
    /// normal / warning / error
    pub anomaly_flag: String,
    pub anomaly_reason: String,
    pub image_path: Option<String>,
    /// 模型原始返回, 留存备查
    pub raw_response: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InvoiceRecord {
    /// 识别成功后的新记录
    #[allow(clippy::too_many_arguments)]
    pub fn recognized(
        rec: RecognizedInvoice,
        expense_category: String,
        reimbursement_person: Option<String>,
        anomaly_flag: String,
        anomaly_reason: String,
        image_path: String,
        raw_response: Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            invoice_no: rec.invoice_no,
            invoice_date: rec.invoice_date,
            invoice_type: rec.invoice_type,
            seller_name: rec.seller_name,
            seller_tax_no: rec.seller_tax_no,
            amount: rec.amount,
            tax_amount: rec.tax_amount,
            total_amount: rec.total_amount,
            expense_category: Some(expense_category),
            reimbursement_person,
            confidence: rec.confidence,
            anomaly_flag,
            anomaly_reason,
            image_path: Some(image_path),
            raw_response: Some(raw_response),
            created_at: now,
            updated_at: now,
        }
    }

    /// 识别失败仍然落一条 error 记录, 不中断批次
    pub fn recognition_failed(image_path: String, reimbursement_person: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            invoice_no: None,
            invoice_date: None,
            invoice_type: None,
            seller_name: None,
            seller_tax_no: None,
            amount: BigDecimal::zero(),
            tax_amount: BigDecimal::zero(),
            total_amount: BigDecimal::zero(),
            expense_category: None,
            reimbursement_person,
            confidence: 0.0,
            anomaly_flag: "error".to_string(),
            anomaly_reason: "识别失败".to_string(),
            image_path: Some(image_path),
            raw_response: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// 人工修正允许更新的字段子集
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoiceUpdate {
    pub expense_category: Option<String>,
    pub reimbursement_person: Option<String>,
    pub anomaly_flag: Option<String>,
    pub anomaly_reason: Option<String>,
}

/// 按费用科目的汇总行
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CategorySummary {
    pub category: String,
    pub count: i64,
    pub amount: BigDecimal,
    pub tax_amount: BigDecimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_supported_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
        assert_eq!(parse_invoice_date("2025-01-10"), Some(expected));
        assert_eq!(parse_invoice_date("2025/01/10"), Some(expected));
        assert_eq!(parse_invoice_date("2025年01月10日"), Some(expected));
        assert_eq!(parse_invoice_date("2025.01.10"), Some(expected));
    }

    #[test]
    fn unparseable_date_is_none() {
        assert_eq!(parse_invoice_date(""), None);
        assert_eq!(parse_invoice_date("昨天"), None);
        assert_eq!(parse_invoice_date("10/01/2025"), None);
    }

    #[test]
    fn coerces_numeric_strings() {
        let raw = json!({
            "amount": "29659.07",
            "tax_amount": "¥1,234.50",
            "confidence": "0.8"
        });
        let rec = RecognizedInvoice::from_raw(&raw);
        assert_eq!(rec.amount, BigDecimal::from_str("29659.07").unwrap());
        assert_eq!(rec.tax_amount, BigDecimal::from_str("1234.50").unwrap());
        assert_eq!(rec.confidence, 0.8);
    }

    #[test]
    fn bad_numeric_fields_fall_back_to_zero() {
        let raw = json!({
            "amount": "一百元",
            "tax_amount": null,
            "total_amount": {"nested": true}
        });
        let rec = RecognizedInvoice::from_raw(&raw);
        assert_eq!(rec.amount, BigDecimal::zero());
        assert_eq!(rec.tax_amount, BigDecimal::zero());
        assert_eq!(rec.total_amount, BigDecimal::zero());
    }

    #[test]
    fn total_defaults_to_amount_plus_tax() {
        let raw = json!({"amount": 100.0, "tax_amount": 6.0});
        let rec = RecognizedInvoice::from_raw(&raw);
        assert_eq!(rec.total_amount, BigDecimal::from(106));
    }

    #[test]
    fn confidence_defaults_and_clamps() {
        let rec = RecognizedInvoice::from_raw(&json!({}));
        assert_eq!(rec.confidence, 0.5);

        let rec = RecognizedInvoice::from_raw(&json!({"confidence": 1.7}));
        assert_eq!(rec.confidence, 1.0);
    }

    #[test]
    fn invoice_type_falls_back_to_doc_type() {
        let raw = json!({"doc_type": "费用报销单"});
        let rec = RecognizedInvoice::from_raw(&raw);
        assert_eq!(rec.invoice_type.as_deref(), Some("费用报销单"));
    }

    #[test]
    fn person_precedence_handler_first() {
        let raw = json!({"handler": "张三", "payee": "李四", "reimbursement_person": "王五"});
        let rec = RecognizedInvoice::from_raw(&raw);
        assert_eq!(rec.resolved_person(Some("赵六")).as_deref(), Some("张三"));

        let raw = json!({"payee": "李四"});
        let rec = RecognizedInvoice::from_raw(&raw);
        assert_eq!(rec.resolved_person(Some("赵六")).as_deref(), Some("李四"));

        let rec = RecognizedInvoice::from_raw(&json!({}));
        assert_eq!(rec.resolved_person(Some("赵六")).as_deref(), Some("赵六"));
        assert_eq!(rec.resolved_person(None), None);
    }

    #[test]
    fn failed_recognition_record_is_error_flagged() {
        let record = InvoiceRecord::recognition_failed("./uploads/x.jpg".into(), None);
        assert_eq!(record.anomaly_flag, "error");
        assert_eq!(record.anomaly_reason, "识别失败");
        assert_eq!(record.confidence, 0.0);
        assert_eq!(record.total_amount, BigDecimal::zero());
    }
}
