use std::path::{Path, PathBuf};

use eye_strain_core::{ReportError, SessionReport};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write report file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to render report: {0}")]
    Render(#[from] ReportError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedReport {
    pub text_path: String,
    pub csv_path: String,
}

/// 报告文件名（不含扩展名）：开始时间加会话 id 前 8 位，同一秒开始的会话互不覆盖
pub fn report_stem(id: &Uuid, report: &SessionReport) -> String {
    let simple = id.simple().to_string();
    format!("{}_{}", report.file_stem(), &simple[..8])
}

/// 把会话报告写入报告目录：`<stem>.txt` 为完整文本报告，`<stem>.csv` 仅含逐分钟表
#[derive(Debug, Clone)]
pub struct ReportExporter {
    dir: PathBuf,
}

impl ReportExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn export(
        &self,
        id: &Uuid,
        report: &SessionReport,
    ) -> Result<ExportedReport, ExportError> {
        let text = report.to_text()?;
        let csv = report.to_csv()?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let stem = report_stem(id, report);
        let text_path = self.dir.join(format!("{stem}.txt"));
        let csv_path = self.dir.join(format!("{stem}.csv"));

        tokio::fs::write(&text_path, text).await?;
        tokio::fs::write(&csv_path, csv).await?;

        tracing::info!(
            text = %text_path.display(),
            csv = %csv_path.display(),
            "Session report exported"
        );

        Ok(ExportedReport {
            text_path: text_path.to_string_lossy().to_string(),
            csv_path: csv_path.to_string_lossy().to_string(),
        })
    }
}
