use crate::store::models::{Product, UploadedFile};

const STRATIFY_SYSTEM_PROMPT: &str = "You are StratifyPM, an expert AI assistant for product managers. \
You help with product strategy, roadmap planning, feature prioritization, user research synthesis, \
PRDs and user stories, metrics and OKRs, competitive analysis, go-to-market planning and stakeholder \
communication. Give structured, actionable answers. Use frameworks such as RICE, MoSCoW, Kano, \
Jobs-to-be-Done and North Star metrics where they help. When data from uploaded files is provided, \
ground your analysis in it and cite concrete figures. Keep a professional, concise tone.";

const MEETINGMIND_SYSTEM_PROMPT: &str = "You are MeetingMind, an AI assistant for meeting productivity. \
You help plan agendas, summarize meetings and transcripts, extract decisions and action items with \
owners and due dates, draft follow-up emails, and improve how teams run meetings. When transcripts or \
notes are provided, base your answer on them and do not invent attendees or decisions. Keep answers \
structured and concise.";

const STRATIFY_DOMAIN: &str = "product management (strategy, roadmaps, prioritization, user research, \
PRDs, metrics, go-to-market, stakeholder management, or analysis of product data)";

const MEETINGMIND_DOMAIN: &str = "meetings and team productivity (agendas, meeting notes, transcripts, \
summaries, action items, follow-ups, or collaboration practices)";

const STRATIFY_EXAMPLES: &str = "Message: \"How should I prioritize my backlog?\"\nAnswer: yes\n\
Message: \"Write a PRD for a mobile onboarding flow\"\nAnswer: yes\n\
Message: \"What's a good recipe for lasagna?\"\nAnswer: no\n\
Message: \"Who won the football match last night?\"\nAnswer: no\n";

const MEETINGMIND_EXAMPLES: &str = "Message: \"Summarize this meeting transcript\"\nAnswer: yes\n\
Message: \"Draft an agenda for our weekly sync\"\nAnswer: yes\n\
Message: \"What's a good recipe for lasagna?\"\nAnswer: no\n\
Message: \"Explain quantum entanglement\"\nAnswer: no\n";

/// Phrases indicating the user wants their uploaded data analysed. These
/// skip classification.
const FILE_ANALYSIS_TRIGGERS: [&str; 10] = [
    "analyze the uploaded",
    "analyse the uploaded",
    "analyze this file",
    "analyze the file",
    "analyze the data",
    "uploaded file",
    "uploaded data",
    "in the file",
    "from the file",
    "in this data",
];

pub fn system_prompt(product: Product) -> &'static str {
    match product {
        Product::StratifyPm => STRATIFY_SYSTEM_PROMPT,
        Product::MeetingMind => MEETINGMIND_SYSTEM_PROMPT,
    }
}

/// Few-shot prompt asking for a one-word yes/no domain verdict.
pub fn classifier_prompt(product: Product, message: &str) -> String {
    let (domain, examples) = match product {
        Product::StratifyPm => (STRATIFY_DOMAIN, STRATIFY_EXAMPLES),
        Product::MeetingMind => (MEETINGMIND_DOMAIN, MEETINGMIND_EXAMPLES),
    };
    format!(
        "Decide whether the message below is related to {domain}. \
Greetings and questions about what you can do count as related. \
Reply with a single word: yes or no.\n\n{examples}Message: \"{message}\"\nAnswer:"
    )
}

/// Fixed reply for out-of-domain messages.
pub fn rejection_message(product: Product) -> &'static str {
    match product {
        Product::StratifyPm => "I'm StratifyPM, and I specialize in product management. \
I can help with product strategy, roadmaps, feature prioritization, user research, PRDs, metrics \
and go-to-market planning. Could you ask me something related to product management?",
        Product::MeetingMind => "I'm MeetingMind, and I focus on meetings and team productivity. \
I can help with agendas, meeting summaries, action items, follow-ups and better meeting habits. \
Could you ask me something related to your meetings?",
    }
}

pub fn is_file_analysis_request(message: &str) -> bool {
    let lower = message.to_lowercase();
    FILE_ANALYSIS_TRIGGERS.iter().any(|t| lower.contains(t))
}

/// Final user turn: the message, then a capped JSON sample of every
/// uploaded file, then any retrieved context.
pub fn render_user_turn(
    message: &str,
    files: &[UploadedFile],
    max_sample_rows: usize,
    context: Option<&str>,
) -> String {
    let mut prompt = message.to_string();

    if !files.is_empty() {
        prompt.push_str("\n\nUploaded files data:\n");
        for file in files {
            let sample_len = file.content.len().min(max_sample_rows);
            let sample = &file.content[..sample_len];
            prompt.push_str(&format!(
                "\nFile: {} ({}, {} rows{})\n",
                file.name,
                file.file_type,
                file.content.len(),
                if sample_len < file.content.len() {
                    format!(", first {} shown", sample_len)
                } else {
                    String::new()
                }
            ));
            prompt.push_str(&serde_json::to_string(sample).unwrap_or_else(|_| "[]".to_string()));
            prompt.push('\n');
            if let Some(insights) = file.insights.as_ref().filter(|i| !i.is_empty()) {
                prompt.push_str("Insights:\n");
                for insight in insights {
                    prompt.push_str(&format!("- {}\n", insight));
                }
            }
        }
    }

    if let Some(context) = context.filter(|c| !c.trim().is_empty()) {
        prompt.push_str("\n\nCurrent information from web search:\n");
        prompt.push_str(context);
        prompt.push_str(
            "\n\nUse this current information where relevant and mention the sources you rely on.",
        );
    }

    prompt
}
