//! Validation helpers for DTOs.

use validator::ValidationError;

use crate::services::catalog::parse_playlist_id;

/// Validates that the text is a playlist share link, catalog URI, or bare id.
///
/// # Examples
///
/// ```ignore
/// validate_playlist_url("https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M") // Ok
/// validate_playlist_url("spotify:playlist:37i9dQZF1DXcBWIGoYBM5M")                // Ok
/// validate_playlist_url("https://open.spotify.com/album/1")                        // Err
/// ```
pub fn validate_playlist_url(url: &str) -> Result<(), ValidationError> {
    if parse_playlist_id(url).is_none() {
        let mut err = ValidationError::new("playlist_url_format");
        err.message = Some("Expected a playlist link, a playlist URI or a playlist id".into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_playlist_url_valid() {
        assert!(validate_playlist_url("https://open.spotify.com/playlist/abc123?si=x").is_ok());
        assert!(validate_playlist_url("spotify:playlist:abc123").is_ok());
        assert!(validate_playlist_url("abc123").is_ok());
    }

    #[test]
    fn test_validate_playlist_url_invalid() {
        assert!(validate_playlist_url("").is_err());
        assert!(validate_playlist_url("https://open.spotify.com/album/abc").is_err());
        assert!(validate_playlist_url("two words").is_err());
    }
}
