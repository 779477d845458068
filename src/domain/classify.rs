use mime_guess::Mime;

/// Assigns a bucket to a content type. A pure function of `t` alone —
/// classification must never consult anything about the uploading user
/// or request.
pub fn classify_bucket<'a>(t: &Mime, image_bucket: &'a str, other_bucket: &'a str) -> &'a str {
    if t.type_() == mime_guess::mime::IMAGE {
        image_bucket
    } else {
        other_bucket
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn classifies_images_into_the_image_bucket() {
        let png = Mime::from_str("image/png").unwrap();
        assert_eq!(classify_bucket(&png, "images", "other"), "images");
    }

    #[test]
    fn classifies_everything_else_into_the_other_bucket() {
        let pdf = Mime::from_str("application/pdf").unwrap();
        assert_eq!(classify_bucket(&pdf, "images", "other"), "other");
    }

    #[test]
    fn is_pure_in_the_content_type_alone() {
        let jpeg_a = Mime::from_str("image/jpeg").unwrap();
        let jpeg_b = Mime::from_str("image/jpeg").unwrap();
        assert_eq!(
            classify_bucket(&jpeg_a, "images", "other"),
            classify_bucket(&jpeg_b, "images", "other")
        );
    }
}
