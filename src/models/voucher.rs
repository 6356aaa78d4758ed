use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

/// 借贷方向
pub const DIRECTION_DEBIT: &str = "借";
pub const DIRECTION_CREDIT: &str = "贷";

/// 凭证分录行 (导出模板的一行, 按需生成, 不落库)
///
/// 序列化字段名与财务软件导入模板保持一致。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoucherEntry {
    #[serde(rename = "编制日期")]
    pub voucher_date: String,
    #[serde(rename = "凭证类型")]
    pub voucher_type: String,
    #[serde(rename = "凭证序号")]
    pub sequence_no: u32,
    #[serde(rename = "凭证号")]
    pub voucher_no: String,
    #[serde(rename = "制单人")]
    pub maker: String,
    #[serde(rename = "附件张数")]
    pub attachment_count: i64,
    #[serde(rename = "会计年度")]
    pub fiscal_period: String,
    #[serde(rename = "科目编码")]
    pub account_code: String,
    #[serde(rename = "科目名称")]
    pub account_name: String,
    #[serde(rename = "凭证摘要")]
    pub summary: String,
    #[serde(rename = "借贷方向")]
    pub direction: String,
    #[serde(rename = "金额")]
    pub amount: BigDecimal,
    #[serde(rename = "币种")]
    pub currency: String,
    #[serde(rename = "汇率")]
    pub exchange_rate: f64,
    #[serde(rename = "原币金额")]
    pub original_amount: BigDecimal,
    #[serde(rename = "数量")]
    pub quantity: Option<f64>,
    #[serde(rename = "单价")]
    pub unit_price: Option<f64>,
    #[serde(rename = "结算方式名称")]
    pub settlement_method: String,
    #[serde(rename = "结算日期")]
    pub settlement_date: String,
    #[serde(rename = "结算票号")]
    pub settlement_no: String,
    #[serde(rename = "业务日期")]
    pub business_date: String,
    #[serde(rename = "员工编号")]
    pub employee_no: String,
    #[serde(rename = "员工姓名")]
    pub employee_name: String,
    #[serde(rename = "往来单位编号")]
    pub counterparty_no: String,
    #[serde(rename = "往来单位名称")]
    pub counterparty_name: String,
    #[serde(rename = "货品编号")]
    pub goods_no: String,
    #[serde(rename = "货品名称")]
    pub goods_name: String,
    #[serde(rename = "部门名称")]
    pub department: String,
    #[serde(rename = "项目名称")]
    pub project: String,
}
