//! Per-model vector index naming and vector serialisation.
//!
//! One vec0 virtual table exists per embedding model in use, named
//! `vec_chunks_<slug>`. The slug is a pure function of the provider/model
//! string: lowercase, with every non-alphanumeric character replaced by an
//! underscore. These tables are created on demand, not by migrations.

use crate::error::{Error, Result};

/// Derive the table-name slug for a provider/model string.
///
/// `openai/text-embedding-3-small` → `openai_text_embedding_3_small`
pub fn model_slug(model: &str) -> String {
    model
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Full vec table name for a slug.
pub fn vec_table_name(slug: &str) -> Result<String> {
    if slug.is_empty() || !slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
        return Err(Error::StoreIntegrity(format!(
            "invalid vector table slug '{slug}'"
        )));
    }
    Ok(format!("vec_chunks_{slug}"))
}

/// Serialise a vector as little-endian f32 bytes, the layout sqlite-vec
/// stores and matches against.
pub fn encode_vector(values: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 4);
    for value in values {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

/// Inverse of [`encode_vector`]. Returns None on a length mismatch.
pub fn decode_vector(blob: &[u8], dimension: usize) -> Option<Vec<f32>> {
    if dimension == 0 || blob.len() != dimension * 4 {
        return None;
    }
    Some(
        blob.chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    )
}

/// Extract the dimension from a vec0 CREATE statement (`float[N]`).
pub fn parse_vec0_dimension(create_sql: &str) -> Option<usize> {
    let start = create_sql.find("float[")?;
    let rest = &create_sql[start + 6..];
    let end = rest.find(']')?;
    rest[..end].trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_is_lowercase_underscored() {
        assert_eq!(
            model_slug("openai/text-embedding-3-small"),
            "openai_text_embedding_3_small"
        );
        assert_eq!(model_slug("Ollama/Nomic-Embed.v1"), "ollama_nomic_embed_v1");
    }

    #[test]
    fn slug_is_stable() {
        let model = "openai/text-embedding-3-large";
        assert_eq!(model_slug(model), model_slug(model));
    }

    #[test]
    fn table_name_validates_slug() {
        assert_eq!(
            vec_table_name("openai_te3").unwrap(),
            "vec_chunks_openai_te3"
        );
        assert!(vec_table_name("bad; drop").is_err());
        assert!(vec_table_name("").is_err());
    }

    #[test]
    fn vector_roundtrip() {
        let v = vec![0.5_f32, -1.25, 3.0];
        let blob = encode_vector(&v);
        assert_eq!(blob.len(), 12);
        assert_eq!(decode_vector(&blob, 3).unwrap(), v);
        assert!(decode_vector(&blob, 4).is_none());
    }

    #[test]
    fn dimension_parses_from_ddl() {
        let sql = "CREATE VIRTUAL TABLE vec_chunks_x USING vec0(embedding float[1536])";
        assert_eq!(parse_vec0_dimension(sql), Some(1536));
        assert_eq!(parse_vec0_dimension("CREATE TABLE t(x)"), None);
    }
}
