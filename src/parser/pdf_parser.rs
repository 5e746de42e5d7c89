use anyhow::Result;
use tracing::{info, warn};

pub struct PdfParser;

impl PdfParser {
    pub fn new() -> Self {
        Self
    }

    /// 从内存中的PDF提取完整文本
    pub fn extract_text(&self, bytes: &[u8]) -> Result<String> {
        if bytes.is_empty() {
            return Err(anyhow::anyhow!("PDF内容为空"));
        }
        if !bytes.starts_with(b"%PDF") {
            return Err(anyhow::anyhow!("不是有效的PDF文件"));
        }

        let text = pdf_extract::extract_text_from_mem(bytes)?;

        if text.trim().is_empty() {
            warn!("PDF中未提取到文本内容，可能是扫描件或受保护文档");
        } else {
            info!("提取文本长度: {} 字符", text.len());
        }

        Ok(text)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 单页、Helvetica 字体的最小 PDF，交叉引用表偏移按实际字节计算
    pub(crate) fn sample_pdf(text: &str) -> Vec<u8> {
        let stream = format!("BT /F1 18 Tf 72 720 Td ({}) Tj ET", text);
        let objects = [
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 5 0 R >> >> /Contents 4 0 R >>"
                .to_string(),
            format!("<< /Length {} >>\nstream\n{}\nendstream", stream.len(), stream),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
                .to_string(),
        ];

        let mut pdf = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::new();
        for (i, body) in objects.iter().enumerate() {
            offsets.push(pdf.len());
            pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
        }

        let xref_offset = pdf.len();
        let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
        for offset in offsets {
            xref.push_str(&format!("{:010} 00000 n \n", offset));
        }
        xref.push_str(&format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_offset
        ));
        pdf.extend_from_slice(xref.as_bytes());
        pdf
    }

    #[test]
    fn extracts_text_from_valid_pdf() {
        let text = PdfParser::new()
            .extract_text(&sample_pdf("Paris is the capital of France"))
            .unwrap();
        assert!(text.contains("Paris"));
        assert!(text.contains("capital"));
    }

    #[test]
    fn rejects_empty_input() {
        assert!(PdfParser::new().extract_text(&[]).is_err());
    }

    #[test]
    fn rejects_non_pdf_bytes() {
        let err = PdfParser::new()
            .extract_text(b"<html>not a pdf</html>")
            .unwrap_err();
        assert!(err.to_string().contains("PDF"));
    }
}
