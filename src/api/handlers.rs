use crate::config::AppConfig;
use crate::db::queries;
use crate::models::{
    CategorySummary, InvoiceRecord, InvoiceUpdate, RecognizedInvoice, VoucherEntry,
    DIRECTION_CREDIT, DIRECTION_DEBIT,
};
use crate::service::recognizer::GlmClient;
use crate::service::{anomaly, classifier, export, voucher};
use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// 允许上传的文件类型
const ALLOWED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "pdf"];

/// 共享状态
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub glm: Arc<GlmClient>,
    pub config: Arc<AppConfig>,
}

/// 统一的失败响应体
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let body = ErrorResponse {
        success: false,
        message: message.into(),
    };
    (status, Json(body)).into_response()
}

/// 健康检查
pub async fn health_check() -> &'static str {
    "OK"
}

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    pub reimbursement_person: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub task_id: Uuid,
    pub total_count: usize,
    pub processed: usize,
    pub message: String,
}

/// 批量上传发票图片: 保存 -> 识别 -> 分类 -> 异常检测 -> 落库
///
/// 单个文件识别失败只落一条 error 记录, 不影响批次里的其他文件。
pub async fn upload_invoices(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    mut multipart: Multipart,
) -> Response {
    let task_id = Uuid::new_v4();
    let mut total_count = 0usize;
    let mut processed = 0usize;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return error_response(StatusCode::BAD_REQUEST, format!("读取上传内容失败: {}", e))
            }
        };
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };

        total_count += 1;
        if total_count > state.config.upload.max_files_per_batch {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!(
                    "最多支持 {} 张发票同时上传",
                    state.config.upload.max_files_per_batch
                ),
            );
        }

        let ext = file_name
            .rsplit('.')
            .next()
            .unwrap_or_default()
            .to_lowercase();
        if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
            tracing::warn!("跳过不支持的文件类型: {}", file_name);
            continue;
        }

        let data = match field.bytes().await {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!("读取文件 {} 失败: {}", file_name, e);
                continue;
            }
        };
        if data.len() > state.config.upload.max_file_size {
            tracing::warn!("跳过超限文件 {} ({} 字节)", file_name, data.len());
            continue;
        }

        let file_path = format!("{}/{}.{}", state.config.upload.dir, Uuid::new_v4(), ext);
        if let Err(e) = tokio::fs::write(&file_path, &data).await {
            tracing::error!("保存文件 {} 失败: {}", file_name, e);
            continue;
        }

        let record = match state
            .glm
            .recognize_invoice(std::path::Path::new(&file_path))
            .await
        {
            Ok(raw) => {
                let rec = RecognizedInvoice::from_raw(&raw);
                // 识别器给出的科目优先, 缺失才走关键词分类
                let category = rec.expense_category.clone().unwrap_or_else(|| {
                    classifier::classify_expense(
                        rec.seller_name.as_deref().unwrap_or_default(),
                        &rec.items,
                    )
                    .to_string()
                });
                let person = rec.resolved_person(params.reimbursement_person.as_deref());
                let (flag, reason) = anomaly::detect_anomalies(
                    &state.config.rules,
                    &rec.total_amount,
                    rec.invoice_date,
                    rec.confidence,
                    rec.invoice_no.as_deref(),
                );
                processed += 1;
                InvoiceRecord::recognized(
                    rec,
                    category,
                    person,
                    flag.as_str().to_string(),
                    reason,
                    file_path,
                    raw,
                )
            }
            Err(e) => {
                tracing::error!("识别失败 {}: {}", file_name, e);
                InvoiceRecord::recognition_failed(file_path, params.reimbursement_person.clone())
            }
        };

        if let Err(e) = queries::insert_invoice(&state.pool, &record).await {
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e));
        }
    }

    let response = UploadResponse {
        task_id,
        total_count,
        processed,
        message: format!("成功处理 {}/{} 张发票", processed, total_count),
    };
    (StatusCode::OK, Json(response)).into_response()
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_size")]
    pub size: u32,
    pub category: Option<String>,
    #[serde(default)]
    pub anomaly_only: bool,
}

fn default_page() -> u32 {
    1
}

fn default_size() -> u32 {
    20
}

#[derive(Debug, Serialize)]
pub struct InvoiceListResponse {
    pub items: Vec<InvoiceRecord>,
    pub total: i64,
    pub page: u32,
    pub size: u32,
}

/// 查询发票列表
pub async fn list_invoices(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Response {
    let page = params.page.max(1);
    let size = params.size.clamp(1, 100);

    match queries::list_invoices(
        &state.pool,
        params.category.as_deref(),
        params.anomaly_only,
        page,
        size,
    )
    .await
    {
        Ok((items, total)) => {
            let response = InvoiceListResponse {
                items,
                total,
                page,
                size,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e)),
    }
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub by_category: Vec<CategorySummary>,
    pub total_count: i64,
    pub total_amount: BigDecimal,
    pub total_tax: BigDecimal,
    pub anomaly_count: i64,
}

/// 获取汇总统计
pub async fn get_summary(State(state): State<AppState>) -> Response {
    let result: Result<SummaryResponse, sqlx::Error> = async {
        let by_category = queries::category_summary(&state.pool).await?;
        let totals = queries::invoice_totals(&state.pool).await?;
        Ok(SummaryResponse {
            by_category,
            total_count: totals.total_count,
            total_amount: totals.total_amount,
            total_tax: totals.total_tax,
            anomaly_count: totals.anomaly_count,
        })
    }
    .await;

    match result {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e)),
    }
}

/// 导出四段式报表 (明细/汇总/异常/凭证)
pub async fn export_workbook(State(state): State<AppState>) -> Response {
    let today = chrono::Local::now().date_naive().to_string();

    let result: Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> = async {
        let invoices = queries::list_all_invoices(&state.pool).await?;
        let summary = queries::category_summary(&state.pool).await?;
        let anomalies: Vec<InvoiceRecord> = invoices
            .iter()
            .filter(|inv| inv.anomaly_flag != "normal")
            .cloned()
            .collect();
        let vouchers = voucher::generate_vouchers(&invoices, &today, "转", "系统", "");
        export::render_workbook_csv(&invoices, &summary, &anomalies, &vouchers)
    }
    .await;

    match result {
        Ok(bytes) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=invoices_{}.csv", today),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e)),
    }
}

/// 查询单张发票
pub async fn get_invoice(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match queries::get_invoice(&state.pool, id).await {
        Ok(Some(record)) => (StatusCode::OK, Json(record)).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "发票不存在"),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e)),
    }
}

/// 更新发票信息 (人工修正)
pub async fn update_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<InvoiceUpdate>,
) -> Response {
    match queries::update_invoice(&state.pool, id, &update).await {
        Ok(Some(record)) => (StatusCode::OK, Json(record)).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "发票不存在"),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e)),
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// 删除发票及其原图
pub async fn delete_invoice(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match queries::delete_invoice(&state.pool, id).await {
        Ok(Some(image_path)) => {
            if let Some(path) = image_path {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    tracing::warn!("删除图片 {} 失败: {}", path, e);
                }
            }
            let response = MessageResponse {
                message: "删除成功".to_string(),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Ok(None) => error_response(StatusCode::NOT_FOUND, "发票不存在"),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e)),
    }
}

#[derive(Debug, Deserialize)]
pub struct VoucherGenerateRequest {
    pub invoice_ids: Vec<Uuid>,
    pub voucher_date: String,
    #[serde(default = "default_voucher_type")]
    pub voucher_type: String,
    #[serde(default = "default_maker")]
    pub maker: String,
    #[serde(default)]
    pub department: String,
}

fn default_voucher_type() -> String {
    "转".to_string()
}

fn default_maker() -> String {
    "系统".to_string()
}

#[derive(Debug, Serialize)]
pub struct VoucherGenerateResponse {
    pub vouchers: Vec<VoucherEntry>,
    pub total_debit: BigDecimal,
    pub total_credit: BigDecimal,
}

/// 生成凭证分录
pub async fn generate_voucher_entries(
    State(state): State<AppState>,
    Json(req): Json<VoucherGenerateRequest>,
) -> Response {
    match queries::fetch_by_ids(&state.pool, &req.invoice_ids).await {
        Ok(invoices) if invoices.is_empty() => {
            error_response(StatusCode::NOT_FOUND, "未找到指定发票")
        }
        Ok(invoices) => {
            let vouchers = voucher::generate_vouchers(
                &invoices,
                &req.voucher_date,
                &req.voucher_type,
                &req.maker,
                &req.department,
            );
            let total_debit = sum_direction(&vouchers, DIRECTION_DEBIT);
            let total_credit = sum_direction(&vouchers, DIRECTION_CREDIT);
            let response = VoucherGenerateResponse {
                vouchers,
                total_debit,
                total_credit,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e)),
    }
}

fn sum_direction(entries: &[VoucherEntry], direction: &str) -> BigDecimal {
    entries
        .iter()
        .filter(|e| e.direction == direction)
        .fold(BigDecimal::zero(), |acc, e| acc + &e.amount)
}
