use crate::domain::ports::Storage;
use crate::utils::error::{ReconcileError, Result};
use crate::utils::validation::SUPPORTED_EXTENSIONS;
use reqwest::Client;
use std::path::Path;
use url::Url;

#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: String,
}

impl LocalStorage {
    pub fn new(base_path: String) -> Self {
        Self { base_path }
    }
}

impl Storage for LocalStorage {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = Path::new(&self.base_path).join(path);
        let data = tokio::fs::read(full_path).await?;
        Ok(data)
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = Path::new(&self.base_path).join(path);

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(full_path, data).await?;
        Ok(())
    }

    async fn list_files(&self, prefix: &str) -> Result<Vec<String>> {
        let dir = Path::new(&self.base_path).join(prefix);
        let mut entries = tokio::fs::read_dir(&dir).await?;

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// 唯讀的遠端模板來源：`GET {base_url}/{path}`
#[derive(Debug, Clone)]
pub struct HttpStorage {
    base_url: Url,
    client: Client,
}

impl HttpStorage {
    pub fn new(base_url: &str) -> Result<Self> {
        // 確保結尾有斜線，join 時才不會吃掉最後一段路徑
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized).map_err(|e| ReconcileError::InvalidConfigValueError {
            field: "template".to_string(),
            value: base_url.to_string(),
            reason: format!("Invalid URL format: {}", e),
        })?;

        Ok(Self {
            base_url,
            client: Client::new(),
        })
    }

    fn resolve(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ReconcileError::Storage {
                location: path.to_string(),
                message: e.to_string(),
            })
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response> {
        let url = self.resolve(path)?;
        tracing::debug!("🌐 GET {}", url);

        let response = self.client.get(url.clone()).send().await?;
        tracing::debug!("🌐 Response status: {}", response.status());

        if !response.status().is_success() {
            return Err(ReconcileError::Storage {
                location: url.to_string(),
                message: format!("HTTP {}", response.status()),
            });
        }
        Ok(response)
    }
}

impl Storage for HttpStorage {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let response = self.get(path).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn write_file(&self, path: &str, _data: &[u8]) -> Result<()> {
        Err(ReconcileError::Storage {
            location: path.to_string(),
            message: "HTTP storage is read-only".to_string(),
        })
    }

    /// 目錄清單以 JSON 字串陣列回傳
    async fn list_files(&self, prefix: &str) -> Result<Vec<String>> {
        let response = self.get(prefix).await?;
        Ok(response.json::<Vec<String>>().await?)
    }
}

/// 依位置字串選擇本機或 HTTP 儲存
#[derive(Debug, Clone)]
pub enum AnyStorage {
    Local(LocalStorage),
    Http(HttpStorage),
}

impl AnyStorage {
    /// 回傳儲存與在該儲存中的相對路徑。
    /// URL 拆成「目錄」與「檔名」，本機路徑則以目前目錄為基準。
    pub fn for_location(location: &str) -> Result<(Self, String)> {
        if is_remote(location) {
            let (base, file) = location.rsplit_once('/').unwrap_or((location, ""));
            if file.is_empty() {
                return Err(ReconcileError::InvalidConfigValueError {
                    field: "template".to_string(),
                    value: location.to_string(),
                    reason: "URL must name a file".to_string(),
                });
            }
            Ok((AnyStorage::Http(HttpStorage::new(base)?), file.to_string()))
        } else {
            Ok((
                AnyStorage::Local(LocalStorage::new(".".to_string())),
                location.to_string(),
            ))
        }
    }
}

/// 列出模板所在目錄中可讀取的試算表檔案，名稱排序。
/// 遠端位置向目錄 URL 取得 JSON 清單，本機位置則讀取上層目錄。
pub async fn list_templates(location: &str) -> Result<Vec<String>> {
    let (storage, path) = AnyStorage::for_location(location)?;
    let dir = match &storage {
        AnyStorage::Http(_) => String::new(),
        AnyStorage::Local(_) => Path::new(&path)
            .parent()
            .map(|parent| parent.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };

    let mut names: Vec<String> = storage
        .list_files(&dir)
        .await?
        .into_iter()
        .filter(|name| {
            Path::new(name)
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        })
        .collect();
    names.sort();

    tracing::debug!("📂 {} template(s) found next to {}", names.len(), location);
    Ok(names)
}

pub fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

impl Storage for AnyStorage {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        match self {
            AnyStorage::Local(storage) => storage.read_file(path).await,
            AnyStorage::Http(storage) => storage.read_file(path).await,
        }
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        match self {
            AnyStorage::Local(storage) => storage.write_file(path, data).await,
            AnyStorage::Http(storage) => storage.write_file(path, data).await,
        }
    }

    async fn list_files(&self, prefix: &str) -> Result<Vec<String>> {
        match self {
            AnyStorage::Local(storage) => storage.list_files(prefix).await,
            AnyStorage::Http(storage) => storage.list_files(prefix).await,
        }
    }
}
