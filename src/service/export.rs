use crate::models::{CategorySummary, InvoiceRecord, VoucherEntry};
use csv::WriterBuilder;

type ExportError = Box<dyn std::error::Error + Send + Sync>;

/// 明细表列头
const DETAIL_HEADERS: [&str; 12] = [
    "发票号", "日期", "类型", "销方名称", "金额", "税额", "价税合计",
    "费用科目", "报销人", "置信度", "状态", "异常原因",
];

/// 凭证导入模板列头 (列顺序为财务软件兼容面, 不可调整)
const VOUCHER_HEADERS: [&str; 29] = [
    "编制日期", "凭证类型", "凭证序号", "凭证号", "制单人", "附件张数", "会计年度",
    "科目编码", "科目名称", "凭证摘要", "借贷方向", "金额", "币种", "汇率", "原币金额",
    "数量", "单价", "结算方式名称", "结算日期", "结算票号", "业务日期", "员工编号",
    "员工姓名", "往来单位编号", "往来单位名称", "货品编号", "货品名称", "部门名称",
    "项目名称",
];

/// 渲染四段式导出文件: 发票明细表 / 汇总表 / 异常清单 / 凭证导入模板
///
/// 输出 UTF-8 带 BOM 的 CSV, Excel 直接打开中文列头不乱码。
pub fn render_workbook_csv(
    invoices: &[InvoiceRecord],
    summary: &[CategorySummary],
    anomalies: &[InvoiceRecord],
    vouchers: &[VoucherEntry],
) -> Result<Vec<u8>, ExportError> {
    // BOM 先写进缓冲, 各段列数不同所以用 flexible 模式
    let mut writer = WriterBuilder::new()
        .flexible(true)
        .from_writer(vec![0xEF, 0xBB, 0xBF]);

    // Sheet 1: 发票明细表
    writer.write_record(["【发票明细表】"])?;
    writer.write_record(DETAIL_HEADERS)?;
    for inv in invoices {
        writer.write_record([
            inv.invoice_no.clone().unwrap_or_default(),
            inv.invoice_date.map(|d| d.to_string()).unwrap_or_default(),
            inv.invoice_type.clone().unwrap_or_default(),
            inv.seller_name.clone().unwrap_or_default(),
            inv.amount.to_string(),
            inv.tax_amount.to_string(),
            inv.total_amount.to_string(),
            inv.expense_category.clone().unwrap_or_default(),
            inv.reimbursement_person.clone().unwrap_or_default(),
            confidence_percent(inv.confidence),
            status_mark(&inv.anomaly_flag).to_string(),
            inv.anomaly_reason.clone(),
        ])?;
    }
    writer.write_record([""])?;

    // Sheet 2: 汇总表
    writer.write_record(["【汇总表】"])?;
    writer.write_record(["费用科目", "发票数量", "合计金额", "合计税额"])?;
    for row in summary {
        writer.write_record([
            row.category.clone(),
            row.count.to_string(),
            row.amount.to_string(),
            row.tax_amount.to_string(),
        ])?;
    }
    writer.write_record([""])?;

    // Sheet 3: 异常清单
    writer.write_record(["【异常清单】"])?;
    writer.write_record(["发票号", "销方名称", "金额", "异常原因", "原图路径"])?;
    for inv in anomalies {
        writer.write_record([
            inv.invoice_no.clone().unwrap_or_default(),
            inv.seller_name.clone().unwrap_or_default(),
            inv.total_amount.to_string(),
            inv.anomaly_reason.clone(),
            inv.image_path.clone().unwrap_or_default(),
        ])?;
    }
    writer.write_record([""])?;

    // Sheet 4: 凭证导入模板
    writer.write_record(["【凭证导入模板】"])?;
    writer.write_record(VOUCHER_HEADERS)?;
    for v in vouchers {
        writer.write_record([
            v.voucher_date.clone(),
            v.voucher_type.clone(),
            v.sequence_no.to_string(),
            v.voucher_no.clone(),
            v.maker.clone(),
            v.attachment_count.to_string(),
            v.fiscal_period.clone(),
            v.account_code.clone(),
            v.account_name.clone(),
            v.summary.clone(),
            v.direction.clone(),
            v.amount.to_string(),
            v.currency.clone(),
            v.exchange_rate.to_string(),
            v.original_amount.to_string(),
            v.quantity.map(|q| q.to_string()).unwrap_or_default(),
            v.unit_price.map(|p| p.to_string()).unwrap_or_default(),
            v.settlement_method.clone(),
            v.settlement_date.clone(),
            v.settlement_no.clone(),
            v.business_date.clone(),
            v.employee_no.clone(),
            v.employee_name.clone(),
            v.counterparty_no.clone(),
            v.counterparty_name.clone(),
            v.goods_no.clone(),
            v.goods_name.clone(),
            v.department.clone(),
            v.project.clone(),
        ])?;
    }

    writer.flush()?;
    Ok(writer.into_inner()?)
}

fn confidence_percent(confidence: f64) -> String {
    if confidence > 0.0 {
        format!("{:.0}%", confidence * 100.0)
    } else {
        String::new()
    }
}

fn status_mark(anomaly_flag: &str) -> &'static str {
    if anomaly_flag == "normal" {
        "✓"
    } else {
        "⚠"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::voucher::generate_vouchers;
    use bigdecimal::BigDecimal;
    use chrono::Utc;
    use std::str::FromStr;
    use uuid::Uuid;

    fn invoice(category: &str, amount: &str, flag: &str, reason: &str) -> InvoiceRecord {
        let amount = BigDecimal::from_str(amount).unwrap();
        let now = Utc::now();
        InvoiceRecord {
            id: Uuid::new_v4(),
            invoice_no: Some("20250001".to_string()),
            invoice_date: None,
            invoice_type: Some("增值税普票".to_string()),
            seller_name: Some("测试公司".to_string()),
            seller_tax_no: None,
            total_amount: amount.clone(),
            amount,
            tax_amount: BigDecimal::from(0),
            expense_category: Some(category.to_string()),
            reimbursement_person: Some("张三".to_string()),
            confidence: 0.95,
            anomaly_flag: flag.to_string(),
            anomaly_reason: reason.to_string(),
            image_path: Some("./uploads/a.jpg".to_string()),
            raw_response: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn renders_all_four_sections() {
        let invoices = vec![
            invoice("交通费", "100", "normal", ""),
            invoice("办公费", "6000", "warning", "金额>5000元需审批"),
        ];
        let summary = vec![CategorySummary {
            category: "交通费".to_string(),
            count: 1,
            amount: BigDecimal::from(100),
            tax_amount: BigDecimal::from(0),
        }];
        let anomalies: Vec<InvoiceRecord> = invoices
            .iter()
            .filter(|i| i.anomaly_flag != "normal")
            .cloned()
            .collect();
        let vouchers = generate_vouchers(&invoices, "2025-01-31", "转", "系统", "");

        let bytes = render_workbook_csv(&invoices, &summary, &anomalies, &vouchers).unwrap();
        assert_eq!(&bytes[..3], &[0xEF, 0xBB, 0xBF]);

        let text = String::from_utf8(bytes[3..].to_vec()).unwrap();
        for section in ["【发票明细表】", "【汇总表】", "【异常清单】", "【凭证导入模板】"] {
            assert!(text.contains(section), "missing section {}", section);
        }
        assert!(text.contains("金额>5000元需审批"));
        // 2 张发票 2 个科目 -> 2 借 + 1 贷
        assert_eq!(text.matches("660206").count(), 1);
        assert_eq!(text.matches("2241").count(), 1);
    }

    #[test]
    fn confidence_renders_as_percent_or_blank() {
        assert_eq!(confidence_percent(0.95), "95%");
        assert_eq!(confidence_percent(0.0), "");
    }
}
