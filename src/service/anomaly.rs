use crate::config::RuleConfig;
use bigdecimal::BigDecimal;
use chrono::{Local, NaiveDate};

/// 异常标记, 按触发规则数量升级: 0 条 normal, 1 条 warning, >=2 条 error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnomalyFlag {
    Normal,
    Warning,
    Error,
}

impl AnomalyFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyFlag::Normal => "normal",
            AnomalyFlag::Warning => "warning",
            AnomalyFlag::Error => "error",
        }
    }

    fn from_count(count: usize) -> Self {
        match count {
            0 => AnomalyFlag::Normal,
            1 => AnomalyFlag::Warning,
            _ => AnomalyFlag::Error,
        }
    }
}

/// 检测发票异常, 返回 (异常标记, 异常原因)
///
/// 规则按固定顺序独立评估 (金额, 置信度, 日期), 原因用 "; " 拼接。
/// 输入在调用前已完成校验, 本函数不产生错误。
pub fn detect_anomalies(
    rules: &RuleConfig,
    total_amount: &BigDecimal,
    invoice_date: Option<NaiveDate>,
    confidence: f64,
    invoice_no: Option<&str>,
) -> (AnomalyFlag, String) {
    detect_anomalies_on(
        Local::now().date_naive(),
        rules,
        total_amount,
        invoice_date,
        confidence,
        invoice_no,
    )
}

/// 固定 "今天" 的实现, 日期规则可复现
fn detect_anomalies_on(
    today: NaiveDate,
    rules: &RuleConfig,
    total_amount: &BigDecimal,
    invoice_date: Option<NaiveDate>,
    confidence: f64,
    _invoice_no: Option<&str>,
) -> (AnomalyFlag, String) {
    let mut anomalies: Vec<String> = Vec::new();

    // 1. 金额异常 (严格大于阈值)
    if let Ok(threshold) = BigDecimal::try_from(rules.amount_anomaly_threshold) {
        if *total_amount > threshold {
            anomalies.push(format!("金额>{}元需审批", rules.amount_anomaly_threshold));
        }
    }

    // 2. 置信度低
    if confidence < rules.confidence_threshold {
        anomalies.push(format!("识别置信度低({:.0}%)", confidence * 100.0));
    }

    // 3. 日期异常 (缺失日期不算异常, 跳过)
    if let Some(date) = invoice_date {
        let days_ago = (today - date).num_days();
        if days_ago > rules.date_anomaly_days {
            anomalies.push(format!("发票已超过{}天", rules.date_anomaly_days));
        } else if days_ago < 0 {
            anomalies.push("发票日期在未来".to_string());
        }
    }

    let flag = AnomalyFlag::from_count(anomalies.len());
    (flag, anomalies.join("; "))
}
