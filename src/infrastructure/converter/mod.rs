mod pdf;

pub use pdf::PdfConverter;
