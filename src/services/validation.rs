use image::ImageFormat;

/// Pre-flight checks applied to image bytes before they reach the external
/// vision capability. Failing validation is an immediate job failure with
/// no analysis attempt.
pub fn validate_image(data: &[u8], max_size_bytes: u64) -> Result<ImageFormat, ValidationError> {
    if data.is_empty() {
        return Err(ValidationError::Empty);
    }
    if data.len() as u64 > max_size_bytes {
        return Err(ValidationError::TooLarge {
            size: data.len() as u64,
            max: max_size_bytes,
        });
    }
    image::guess_format(data).map_err(|_| ValidationError::UnknownFormat)
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("image input is empty")]
    Empty,

    #[error("image size ({size} bytes) exceeds maximum allowed size ({max} bytes)")]
    TooLarge { size: u64, max: u64 },

    #[error("unrecognized image format")]
    UnknownFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    // Minimal 1x1 transparent PNG.
    const PNG_1X1: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48,
        0x44, 0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00,
        0x00, 0x1F, 0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78,
        0xDA, 0x63, 0x64, 0x60, 0xF8, 0x5F, 0x0F, 0x00, 0x02, 0x84, 0x02, 0x3D, 0x8D, 0x4E,
        0xFB, 0xC3, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
    ];

    #[test]
    fn test_valid_png_accepted() {
        let format = validate_image(PNG_1X1, 20 * 1024 * 1024).unwrap();
        assert_eq!(format, ImageFormat::Png);
    }

    #[test]
    fn test_empty_input_rejected() {
        let result = validate_image(&[], 20 * 1024 * 1024);
        assert!(matches!(result, Err(ValidationError::Empty)));
        assert!(result.unwrap_err().to_string().contains("empty"));
    }

    #[test]
    fn test_oversize_input_rejected() {
        let result = validate_image(PNG_1X1, 16);
        assert!(matches!(result, Err(ValidationError::TooLarge { .. })));
    }

    #[test]
    fn test_garbage_rejected() {
        let result = validate_image(b"definitely not an image", 20 * 1024 * 1024);
        assert!(matches!(result, Err(ValidationError::UnknownFormat)));
    }
}
