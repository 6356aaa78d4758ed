use crate::models::{CategorySummary, InvoiceRecord, InvoiceUpdate};
use bigdecimal::BigDecimal;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

/// 全表汇总
#[derive(Debug, Clone, FromRow)]
pub struct InvoiceTotals {
    pub total_count: i64,
    pub total_amount: BigDecimal,
    pub total_tax: BigDecimal,
    pub anomaly_count: i64,
}

/// 新增发票记录
pub async fn insert_invoice(pool: &PgPool, inv: &InvoiceRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO invoices (
            id, invoice_no, invoice_date, invoice_type, seller_name, seller_tax_no,
            amount, tax_amount, total_amount, expense_category, reimbursement_person,
            confidence, anomaly_flag, anomaly_reason, image_path, raw_response,
            created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
        "#,
    )
    .bind(inv.id)
    .bind(&inv.invoice_no)
    .bind(inv.invoice_date)
    .bind(&inv.invoice_type)
    .bind(&inv.seller_name)
    .bind(&inv.seller_tax_no)
    .bind(&inv.amount)
    .bind(&inv.tax_amount)
    .bind(&inv.total_amount)
    .bind(&inv.expense_category)
    .bind(&inv.reimbursement_person)
    .bind(inv.confidence)
    .bind(&inv.anomaly_flag)
    .bind(&inv.anomaly_reason)
    .bind(&inv.image_path)
    .bind(&inv.raw_response)
    .bind(inv.created_at)
    .bind(inv.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// 按 ID 查询单条
pub async fn get_invoice(pool: &PgPool, id: Uuid) -> Result<Option<InvoiceRecord>, sqlx::Error> {
    sqlx::query_as::<_, InvoiceRecord>("SELECT * FROM invoices WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// 分页查询, 可选科目过滤与 "仅异常" 过滤, 返回 (记录, 总数)
pub async fn list_invoices(
    pool: &PgPool,
    category: Option<&str>,
    anomaly_only: bool,
    page: u32,
    size: u32,
) -> Result<(Vec<InvoiceRecord>, i64), sqlx::Error> {
    let mut count_builder: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT count(*) FROM invoices WHERE 1=1");
    let mut list_builder: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT * FROM invoices WHERE 1=1");

    if let Some(category) = category {
        count_builder.push(" AND expense_category = ").push_bind(category);
        list_builder.push(" AND expense_category = ").push_bind(category);
    }
    if anomaly_only {
        count_builder.push(" AND anomaly_flag <> 'normal'");
        list_builder.push(" AND anomaly_flag <> 'normal'");
    }

    let total: i64 = count_builder.build_query_scalar().fetch_one(pool).await?;

    list_builder
        .push(" ORDER BY created_at DESC LIMIT ")
        .push_bind(size as i64)
        .push(" OFFSET ")
        .push_bind((page.saturating_sub(1) as i64) * size as i64);
    let items = list_builder
        .build_query_as::<InvoiceRecord>()
        .fetch_all(pool)
        .await?;

    Ok((items, total))
}

/// 全量查询 (导出用)
pub async fn list_all_invoices(pool: &PgPool) -> Result<Vec<InvoiceRecord>, sqlx::Error> {
    sqlx::query_as::<_, InvoiceRecord>("SELECT * FROM invoices ORDER BY created_at DESC")
        .fetch_all(pool)
        .await
}

/// 按 ID 集合查询 (凭证生成用)
pub async fn fetch_by_ids(pool: &PgPool, ids: &[Uuid]) -> Result<Vec<InvoiceRecord>, sqlx::Error> {
    sqlx::query_as::<_, InvoiceRecord>(
        "SELECT * FROM invoices WHERE id = ANY($1) ORDER BY created_at",
    )
    .bind(ids)
    .fetch_all(pool)
    .await
}

/// 按费用科目汇总, 未分类记录归入 "其他"
pub async fn category_summary(pool: &PgPool) -> Result<Vec<CategorySummary>, sqlx::Error> {
    sqlx::query_as::<_, CategorySummary>(
        r#"
        SELECT COALESCE(expense_category, '其他') AS category,
               count(*) AS count,
               COALESCE(sum(amount), 0) AS amount,
               COALESCE(sum(tax_amount), 0) AS tax_amount
        FROM invoices
        GROUP BY COALESCE(expense_category, '其他')
        ORDER BY count DESC, category
        "#,
    )
    .fetch_all(pool)
    .await
}

/// 全表合计与异常数量
pub async fn invoice_totals(pool: &PgPool) -> Result<InvoiceTotals, sqlx::Error> {
    sqlx::query_as::<_, InvoiceTotals>(
        r#"
        SELECT count(*) AS total_count,
               COALESCE(sum(amount), 0) AS total_amount,
               COALESCE(sum(tax_amount), 0) AS total_tax,
               count(*) FILTER (WHERE anomaly_flag <> 'normal') AS anomaly_count
        FROM invoices
        "#,
    )
    .fetch_one(pool)
    .await
}

/// 人工修正: 仅允许更新科目/报销人/异常标记/异常原因, 缺省字段保持不变
pub async fn update_invoice(
    pool: &PgPool,
    id: Uuid,
    update: &InvoiceUpdate,
) -> Result<Option<InvoiceRecord>, sqlx::Error> {
    sqlx::query_as::<_, InvoiceRecord>(
        r#"
        UPDATE invoices SET
            expense_category = COALESCE($2, expense_category),
            reimbursement_person = COALESCE($3, reimbursement_person),
            anomaly_flag = COALESCE($4, anomaly_flag),
            anomaly_reason = COALESCE($5, anomaly_reason),
            updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(&update.expense_category)
    .bind(&update.reimbursement_person)
    .bind(&update.anomaly_flag)
    .bind(&update.anomaly_reason)
    .fetch_optional(pool)
    .await
}

/// 删除记录, 返回被删记录的图片路径 (外层 None 表示记录不存在)
pub async fn delete_invoice(
    pool: &PgPool,
    id: Uuid,
) -> Result<Option<Option<String>>, sqlx::Error> {
    sqlx::query_scalar::<_, Option<String>>(
        "DELETE FROM invoices WHERE id = $1 RETURNING image_path",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}
