pub mod codec;
pub mod database;
pub mod gemini;
pub mod ocr;
pub mod storage;
pub mod word;
