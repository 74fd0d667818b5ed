//! Prompt assembly and every message the session writes on its own.
//!
//! Centralising text here keeps the session logic free of string literals and
//! lets tests inspect the exact grounding prompt without a live endpoint.
//!
//! [`build_system_prompt`] is a pure function of the current document (if
//! any), the configuration, and nothing else: the same inputs always produce
//! the same instruction block.

use crate::config::{ChatConfig, GroundingPolicy};
use crate::conversation::Turn;
use crate::document::DocumentContext;
use crate::error::CompletionError;

/// Shown in place of a reply when the endpoint returns an empty message.
pub const EMPTY_REPLY_FALLBACK: &str = "Maaf, saya tidak dapat memberikan respons.";

/// Reply turn when extraction fails during ingestion.
pub const INGEST_FAILURE_MESSAGE: &str =
    "❌ Maaf, terjadi kesalahan saat memproses PDF. Pastikan file adalah PDF yang valid.";

/// Reply turn for failures that are neither configuration nor network related.
pub const GENERIC_FAILURE_MESSAGE: &str =
    "Maaf, terjadi kesalahan saat memproses permintaan Anda.";

const ASSISTANT_ROLE: &str =
    "You are a helpful assistant that helps users understand PDF documents.";

/// Build the system-role instruction for the next completion request.
///
/// Without a document this is the generic role-and-language instruction.
/// With one, it embeds the file name, page count, ingestion date and the
/// extracted text, verbatim unless `config.grounding` caps its length.
pub fn build_system_prompt(context: Option<&DocumentContext>, config: &ChatConfig) -> String {
    let language = &config.response_language;
    let Some(ctx) = context else {
        return format!(
            "{ASSISTANT_ROLE} Provide clear and concise responses based on the document content. \
Respond in {language} language."
        );
    };

    let name = ctx.source_name();
    let content = document_excerpt(ctx.extracted_text(), &config.grounding);

    format!(
        "{ASSISTANT_ROLE}

CURRENT PDF DOCUMENT INFORMATION:
- File Name: {name}
- Number of Pages: {pages}
- Upload Date: {date}

DOCUMENT CONTENT:
{content}

Based on this document content, please provide clear and helpful responses to user questions \
in {language} language. Always reference the document when answering questions about its \
content. If asked about what PDF is open, mention the filename \"{name}\".",
        pages = ctx.page_count(),
        date = ctx.ingested_date(&config.date_format),
    )
}

/// The document text as it goes into the prompt.
///
/// Borrowed unchanged under the default policy; cut on a character boundary
/// with an explicit notice when `max_document_chars` is set and exceeded.
pub fn document_excerpt<'a>(text: &'a str, policy: &GroundingPolicy) -> std::borrow::Cow<'a, str> {
    let Some(limit) = policy.max_document_chars else {
        return text.into();
    };
    match text.char_indices().nth(limit) {
        None => text.into(),
        Some((cut, _)) => {
            let total = text.chars().count();
            format!(
                "{}\n[... document truncated: showing the first {} of {} characters ...]",
                &text[..cut],
                limit,
                total
            )
            .into()
        }
    }
}

/// The tail of `history` that is sent with the next request.
pub fn select_history<'a>(history: &'a [Turn], policy: &GroundingPolicy) -> &'a [Turn] {
    match policy.max_history_turns {
        Some(n) if history.len() > n => &history[history.len() - n..],
        _ => history,
    }
}

/// Confirmation turn appended after a successful ingestion.
pub fn ingest_confirmation(source_name: &str, page_count: usize) -> String {
    format!(
        "✅ PDF \"{source_name}\" berhasil diupload dan diproses! Saya sekarang dapat membantu \
Anda memahami isi dokumen ini. Dokumen ini memiliki {page_count} halaman. Silakan ajukan \
pertanyaan tentang dokumen ini."
    )
}

/// Assistant turn explaining a failed completion request.
///
/// Configuration problems, network/server problems and everything else get
/// distinguishable wording so the user knows whether retrying can help.
pub fn completion_failure_message(err: &CompletionError) -> String {
    match err {
        CompletionError::Configuration { missing } => format!(
            "⚠️ Konfigurasi API belum lengkap: {missing} belum diset. \
Periksa konfigurasi lalu kirim ulang pesan Anda."
        ),
        CompletionError::Transport { status } => format!(
            "🌐 Maaf, server AI mengembalikan kesalahan (HTTP {status}). Silakan coba lagi \
beberapa saat lagi."
        ),
        CompletionError::Network { .. } => {
            "🌐 Maaf, terjadi kesalahan jaringan saat menghubungi server AI. Periksa koneksi \
Anda lalu coba lagi."
                .to_string()
        }
        CompletionError::Parse { .. } => GENERIC_FAILURE_MESSAGE.to_string(),
    }
}
