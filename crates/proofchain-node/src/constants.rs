pub(crate) const API_BASE: &str = "/api/v1";
pub(crate) const DEFAULT_LISTEN: &str = "127.0.0.1:8080";
pub(crate) const DEFAULT_DATA_DIR: &str = "./data";
pub(crate) const INDEX_FILE: &str = "index.html";
