pub mod check;
pub mod init;
pub mod plan;
pub mod render;

use std::io::Read;
use std::path::Path;

use reelsmith_scene_model::RenderRequest;

/// Read a request from a file, or stdin when the path is `-`.
pub fn read_request(path: &Path) -> anyhow::Result<RenderRequest> {
    let content = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read request {}: {e}", path.display()))?
    };
    serde_json::from_str(&content).map_err(|e| anyhow::anyhow!("Invalid request JSON: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_request_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("request.json");
        std::fs::write(
            &path,
            r#"{"backgroundImageUrl":"bg.png","imageEffect":"zoom-in","duration":8}"#,
        )
        .unwrap();

        let request = read_request(&path).unwrap();
        assert_eq!(request.background_image_url.as_deref(), Some("bg.png"));
        assert!((request.duration - 8.0).abs() < 1e-12);
    }

    #[test]
    fn test_read_request_rejects_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("request.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = read_request(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid request JSON"));
    }

    #[test]
    fn test_read_request_missing_file() {
        let err = read_request(Path::new("/nonexistent/request.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read request"));
    }
}
