use crate::models::{InvoiceRecord, VoucherEntry, DIRECTION_CREDIT, DIRECTION_DEBIT};
use crate::service::classifier::{resolve_account, OTHER_CATEGORY};
use bigdecimal::{BigDecimal, Zero};
use indexmap::{IndexMap, IndexSet};

/// 贷方科目 (其他应付款-员工)
const CREDIT_ACCOUNT_CODE: &str = "2241";
const CREDIT_ACCOUNT_NAME: &str = "其他应付款-员工";

/// 单个费用科目的累计值
struct CategoryBucket {
    amount: BigDecimal,
    tax: BigDecimal,
    count: i64,
    /// 组内第一条记录的报销人 (不取多数, 契约如此)
    first_person: Option<String>,
    /// 去重且保序的销方名称
    sellers: IndexSet<String>,
}

impl CategoryBucket {
    fn new(first_person: Option<String>) -> Self {
        Self {
            amount: BigDecimal::zero(),
            tax: BigDecimal::zero(),
            count: 0,
            first_person,
            sellers: IndexSet::new(),
        }
    }
}

/// 根据发票列表生成凭证分录
///
/// 按费用科目分组 (首次出现顺序), 每组一条借方分录 (金额+税额合并),
/// 整批一条贷方分录。空输入返回空列表。
/// 金额逐行独立保留两位小数, 多科目时允许产生分位级偏差。
pub fn generate_vouchers(
    invoices: &[InvoiceRecord],
    voucher_date: &str,
    voucher_type: &str,
    maker: &str,
    department: &str,
) -> Vec<VoucherEntry> {
    if invoices.is_empty() {
        return Vec::new();
    }

    // 按费用科目分组
    let mut buckets: IndexMap<String, CategoryBucket> = IndexMap::new();
    let mut all_persons: IndexSet<String> = IndexSet::new();

    for inv in invoices {
        let category = inv
            .expense_category
            .clone()
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| OTHER_CATEGORY.to_string());

        let bucket = buckets
            .entry(category)
            .or_insert_with(|| CategoryBucket::new(inv.reimbursement_person.clone()));
        bucket.amount += &inv.amount;
        bucket.tax += &inv.tax_amount;
        bucket.count += 1;
        if let Some(seller) = inv.seller_name.as_deref().filter(|s| !s.is_empty()) {
            bucket.sellers.insert(seller.to_string());
        }
        if let Some(person) = inv.reimbursement_person.as_deref().filter(|p| !p.is_empty()) {
            all_persons.insert(person.to_string());
        }
    }

    let month = voucher_date.get(..7).unwrap_or(voucher_date);
    let fiscal_period = month.replace('-', "");
    // 整批分录共用一个凭证序号
    let base = VoucherEntry {
        voucher_date: voucher_date.to_string(),
        voucher_type: voucher_type.to_string(),
        sequence_no: 1,
        voucher_no: "1".to_string(),
        maker: maker.to_string(),
        attachment_count: 0,
        fiscal_period,
        account_code: String::new(),
        account_name: String::new(),
        summary: String::new(),
        direction: String::new(),
        amount: BigDecimal::zero(),
        currency: "人民币".to_string(),
        exchange_rate: 1.0,
        original_amount: BigDecimal::zero(),
        quantity: None,
        unit_price: None,
        settlement_method: String::new(),
        settlement_date: String::new(),
        settlement_no: String::new(),
        business_date: voucher_date.to_string(),
        employee_no: String::new(),
        employee_name: String::new(),
        counterparty_no: String::new(),
        counterparty_name: String::new(),
        goods_no: String::new(),
        goods_name: String::new(),
        department: department.to_string(),
        project: String::new(),
    };

    let mut entries = Vec::with_capacity(buckets.len() + 1);
    let mut grand_total = BigDecimal::zero();
    let mut grand_count = 0i64;

    // 借方分录 (费用科目)
    for (category, bucket) in &buckets {
        let account = resolve_account(category);
        let total = round2(&bucket.amount + &bucket.tax);
        grand_total += &bucket.amount + &bucket.tax;
        grand_count += bucket.count;

        entries.push(VoucherEntry {
            attachment_count: bucket.count,
            account_code: account.code.to_string(),
            account_name: account.name.to_string(),
            summary: format!("报销{}{}费用", month, category),
            direction: DIRECTION_DEBIT.to_string(),
            amount: total.clone(),
            original_amount: total,
            employee_name: bucket.first_person.clone().unwrap_or_default(),
            counterparty_name: collapse_names(&bucket.sellers, "家"),
            ..base.clone()
        });
    }

    // 贷方分录 (其他应付款)
    let credit_total = round2(grand_total);
    entries.push(VoucherEntry {
        attachment_count: grand_count,
        account_code: CREDIT_ACCOUNT_CODE.to_string(),
        account_name: CREDIT_ACCOUNT_NAME.to_string(),
        summary: format!("报销{}费用", month),
        direction: DIRECTION_CREDIT.to_string(),
        amount: credit_total.clone(),
        original_amount: credit_total,
        employee_name: collapse_names(&all_persons, "人"),
        ..base
    });

    entries
}

/// 唯一名称直接使用, 多个收敛为 "{首个}等{N}{家|人}", 无则为空
fn collapse_names(names: &IndexSet<String>, unit: &str) -> String {
    match names.len() {
        0 => String::new(),
        1 => names[0].clone(),
        n => format!("{}等{}{}", names[0], n, unit),
    }
}

fn round2(value: BigDecimal) -> BigDecimal {
    value.round(2).with_scale(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::str::FromStr;
    use uuid::Uuid;

    fn record(
        category: Option<&str>,
        amount: &str,
        tax: &str,
        seller: Option<&str>,
        person: Option<&str>,
    ) -> InvoiceRecord {
        let amount = BigDecimal::from_str(amount).unwrap();
        let tax = BigDecimal::from_str(tax).unwrap();
        let now = Utc::now();
        InvoiceRecord {
            id: Uuid::new_v4(),
            invoice_no: None,
            invoice_date: None,
            invoice_type: None,
            seller_name: seller.map(Into::into),
            seller_tax_no: None,
            total_amount: &amount + &tax,
            amount,
            tax_amount: tax,
            expense_category: category.map(Into::into),
            reimbursement_person: person.map(Into::into),
            confidence: 0.95,
            anomaly_flag: "normal".to_string(),
            anomaly_reason: String::new(),
            image_path: None,
            raw_response: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn dec(v: &str) -> BigDecimal {
        BigDecimal::from_str(v).unwrap()
    }

    fn debit_sum(entries: &[VoucherEntry]) -> BigDecimal {
        entries
            .iter()
            .filter(|e| e.direction == DIRECTION_DEBIT)
            .fold(BigDecimal::zero(), |acc, e| acc + &e.amount)
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(generate_vouchers(&[], "2025-01-31", "转", "系统", "").is_empty());
    }

    #[test]
    fn single_transport_invoice() {
        // 交通费 100 + 税 6 -> 借 660206 106.00, 贷 2241 106.00
        let invoices = vec![record(Some("交通费"), "100", "6", Some("滴滴出行"), Some("张三"))];
        let entries = generate_vouchers(&invoices, "2025-01-31", "转", "系统", "");

        assert_eq!(entries.len(), 2);
        let debit = &entries[0];
        assert_eq!(debit.direction, DIRECTION_DEBIT);
        assert_eq!(debit.account_code, "660206");
        assert_eq!(debit.account_name, "管理费用-交通费");
        assert_eq!(debit.amount, dec("106.00"));
        assert_eq!(debit.attachment_count, 1);
        assert_eq!(debit.employee_name, "张三");
        assert_eq!(debit.counterparty_name, "滴滴出行");
        assert_eq!(debit.summary, "报销2025-01交通费费用");
        assert_eq!(debit.fiscal_period, "202501");

        let credit = &entries[1];
        assert_eq!(credit.direction, DIRECTION_CREDIT);
        assert_eq!(credit.account_code, "2241");
        assert_eq!(credit.account_name, "其他应付款-员工");
        assert_eq!(credit.amount, dec("106.00"));
        assert_eq!(credit.attachment_count, 1);
        assert_eq!(credit.employee_name, "张三");
        assert_eq!(credit.summary, "报销2025-01费用");
    }

    #[test]
    fn same_category_collapses_to_one_debit_line() {
        // 办公费 50 + 办公费 30 -> 一条借方 80.00, 附件 2 张
        let invoices = vec![
            record(Some("办公费"), "50", "0", Some("文具店"), Some("李四")),
            record(Some("办公费"), "30", "0", Some("文具店"), Some("李四")),
        ];
        let entries = generate_vouchers(&invoices, "2025-02-28", "转", "系统", "");

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].account_code, "660201");
        assert_eq!(entries[0].amount, dec("80.00"));
        assert_eq!(entries[0].attachment_count, 2);
        assert_eq!(entries[1].amount, dec("80.00"));
        assert_eq!(entries[1].attachment_count, 2);
    }

    #[test]
    fn one_debit_line_per_category_plus_credit() {
        let invoices = vec![
            record(Some("交通费"), "100", "6", Some("滴滴出行"), Some("张三")),
            record(Some("办公费"), "50", "0", Some("文具店"), Some("张三")),
            record(Some("交通费"), "200", "12", Some("铁路12306"), Some("张三")),
            record(Some("通讯费"), "99", "0", Some("中国电信"), Some("张三")),
        ];
        let entries = generate_vouchers(&invoices, "2025-03-31", "转", "系统", "");

        // 3 个科目 -> 3 借 + 1 贷, 借方顺序为科目首次出现顺序
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].account_code, "660206");
        assert_eq!(entries[0].amount, dec("318.00"));
        assert_eq!(entries[1].account_code, "660201");
        assert_eq!(entries[2].account_code, "660203");
        assert_eq!(entries[3].direction, DIRECTION_CREDIT);
        assert_eq!(debit_sum(&entries), entries[3].amount);
    }

    #[test]
    fn debits_balance_credit_with_fractional_amounts() {
        let invoices = vec![
            record(Some("交通费"), "33.33", "1.17", None, Some("张三")),
            record(Some("办公费"), "66.67", "0.13", None, Some("李四")),
            record(Some("业务招待费"), "12.05", "0.95", None, None),
        ];
        let entries = generate_vouchers(&invoices, "2025-04-30", "转", "系统", "");
        let credit = entries.last().unwrap();
        assert_eq!(credit.direction, DIRECTION_CREDIT);
        assert_eq!(debit_sum(&entries), credit.amount);
        assert_eq!(credit.amount, dec("114.30"));
    }

    #[test]
    fn missing_category_groups_under_other() {
        let invoices = vec![record(None, "10", "0", None, None)];
        let entries = generate_vouchers(&invoices, "2025-01-31", "转", "系统", "");
        assert_eq!(entries[0].account_code, "660299");
        assert_eq!(entries[0].summary, "报销2025-01其他费用");
        assert_eq!(entries[0].employee_name, "");
        assert_eq!(entries[0].counterparty_name, "");
    }

    #[test]
    fn multiple_sellers_collapse_with_count() {
        let invoices = vec![
            record(Some("交通费"), "10", "0", Some("滴滴出行"), Some("张三")),
            record(Some("交通费"), "20", "0", Some("首汽约车"), Some("张三")),
            record(Some("交通费"), "30", "0", Some("滴滴出行"), Some("张三")),
        ];
        let entries = generate_vouchers(&invoices, "2025-01-31", "转", "系统", "");
        assert_eq!(entries[0].counterparty_name, "滴滴出行等2家");
    }

    #[test]
    fn multiple_persons_collapse_on_credit_line() {
        let invoices = vec![
            record(Some("交通费"), "10", "0", None, Some("张三")),
            record(Some("办公费"), "20", "0", None, Some("李四")),
        ];
        let entries = generate_vouchers(&invoices, "2025-01-31", "转", "系统", "");
        assert_eq!(entries.last().unwrap().employee_name, "张三等2人");
    }

    #[test]
    fn group_employee_is_first_record_person() {
        // 第一条记录没有报销人时, 即便后续记录有, 借方员工姓名仍为空
        let invoices = vec![
            record(Some("交通费"), "10", "0", None, None),
            record(Some("交通费"), "20", "0", None, Some("李四")),
        ];
        let entries = generate_vouchers(&invoices, "2025-01-31", "转", "系统", "");
        assert_eq!(entries[0].employee_name, "");
        assert_eq!(entries.last().unwrap().employee_name, "李四");
    }

    #[test]
    fn batch_shares_one_sequence_number() {
        let invoices = vec![
            record(Some("交通费"), "10", "0", None, None),
            record(Some("办公费"), "20", "0", None, None),
        ];
        let entries = generate_vouchers(&invoices, "2025-01-31", "转", "系统", "财务部");
        for entry in &entries {
            assert_eq!(entry.sequence_no, 1);
            assert_eq!(entry.voucher_no, "1");
            assert_eq!(entry.voucher_type, "转");
            assert_eq!(entry.maker, "系统");
            assert_eq!(entry.department, "财务部");
            assert_eq!(entry.business_date, "2025-01-31");
            assert_eq!(entry.currency, "人民币");
        }
    }
}
