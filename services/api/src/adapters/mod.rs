pub mod analysis_llm;
pub mod db;
pub mod payments;
pub mod pdf_render;

pub use analysis_llm::OpenAiAnalysisAdapter;
pub use db::DbAdapter;
pub use payments::StripeCheckoutAdapter;
pub use pdf_render::PdftoppmRenderer;
