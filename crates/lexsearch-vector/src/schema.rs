use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

pub const VECTORS_FILE: &str = "vectors.arrow";
pub const CHUNK_IDS_FILE: &str = "chunk_ids.arrow";
pub const TEXTS_FILE: &str = "texts.arrow";
pub const MANIFEST_FILE: &str = "manifest.json";

pub fn vector_item_field() -> Arc<Field> { Arc::new(Field::new("item", DataType::Float32, false)) }

pub fn vector_data_type(dim: usize) -> DataType {
    DataType::FixedSizeList(vector_item_field(), dim as i32)
}

/// `position: u64, vector: FixedSizeList<f32, dim>`
pub fn build_vectors_schema(dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("position", DataType::UInt64, false),
        Field::new("vector", vector_data_type(dim), false),
    ]))
}

pub fn build_chunk_ids_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("position", DataType::UInt64, false),
        Field::new("chunk_id", DataType::Utf8, false),
    ]))
}

pub fn build_texts_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("position", DataType::UInt64, false),
        Field::new("text", DataType::Utf8, false),
    ]))
}
