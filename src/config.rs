use serde::{Deserialize, Serialize};

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub glm: GlmConfig,
    pub upload: UploadConfig,
    pub rules: RuleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// GLM 视觉模型配置 (识别服务)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlmConfig {
    pub api_key: String,
    pub api_url: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub dir: String,
    pub max_files_per_batch: usize,
    /// 单文件大小上限 (字节)
    pub max_file_size: usize,
}

/// 异常检测规则阈值
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    pub amount_anomaly_threshold: f64,
    pub confidence_threshold: f64,
    pub date_anomaly_days: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "postgres://localhost/invoice_voucher".to_string()),
            },
            glm: GlmConfig::default(),
            upload: UploadConfig::default(),
            rules: RuleConfig::default(),
        }
    }
}

impl Default for GlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_url: "https://open.bigmodel.cn/api/paas/v4/chat/completions".to_string(),
            model: "glm-4.6v".to_string(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: "./uploads".to_string(),
            max_files_per_batch: 200,
            max_file_size: 10 * 1024 * 1024,
        }
    }
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            amount_anomaly_threshold: 5000.0,
            confidence_threshold: 0.9,
            date_anomaly_days: 180,
        }
    }
}

impl AppConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                host: std::env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                port: std::env::var("SERVER_PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(8080),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "postgres://localhost/invoice_voucher".to_string()),
            },
            glm: GlmConfig {
                api_key: std::env::var("GLM_API_KEY").unwrap_or_default(),
                api_url: std::env::var("GLM_API_URL")
                    .unwrap_or_else(|_| GlmConfig::default().api_url),
                model: std::env::var("GLM_MODEL").unwrap_or_else(|_| GlmConfig::default().model),
            },
            upload: UploadConfig {
                dir: std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string()),
                max_files_per_batch: std::env::var("MAX_FILES_PER_BATCH")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(200),
                max_file_size: std::env::var("MAX_UPLOAD_SIZE")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10 * 1024 * 1024),
            },
            rules: RuleConfig {
                amount_anomaly_threshold: std::env::var("AMOUNT_ANOMALY_THRESHOLD")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5000.0),
                confidence_threshold: std::env::var("CONFIDENCE_THRESHOLD")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0.9),
                date_anomaly_days: std::env::var("DATE_ANOMALY_DAYS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(180),
            },
        }
    }
}
