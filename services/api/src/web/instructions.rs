//! services/api/src/web/instructions.rs
//!
//! The fixed instruction handed to the analysis engine for each category.

use ats_gate_core::domain::AnalysisCategory;

const EVALUATION: &str = r#"You are an experienced technical hiring manager. Review the attached résumé against the job description.
Give your professional evaluation of whether the candidate's profile fits the role.
Point out the applicant's strengths and weaknesses with respect to the stated requirements."#;

const IMPROVEMENT_TIPS: &str = r#"You are a career coach who helps professionals grow their skills.
Analyze the attached résumé together with the job description and recommend the specific skills
or certifications the candidate should acquire to fit the role better."#;

const MATCH_PERCENTAGE: &str = r#"You are an ATS (Applicant Tracking System) scanner with a solid understanding of how ATS tools rank candidates.
Evaluate the attached résumé against the job description. Start with the match as a percentage,
then list the keywords that are missing, and finish with your final thoughts."#;

pub fn instruction_for(category: AnalysisCategory) -> &'static str {
    match category {
        AnalysisCategory::Evaluation => EVALUATION,
        AnalysisCategory::ImprovementTips => IMPROVEMENT_TIPS,
        AnalysisCategory::MatchPercentage => MATCH_PERCENTAGE,
    }
}
