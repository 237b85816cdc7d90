//! Prompt text for each agent role

use chrono::Utc;

use super::brief::ResearchBrief;

fn today() -> String {
    Utc::now().format("%a %b %-d, %Y").to_string()
}

pub(crate) fn clarify_system() -> String {
    format!(
        "You decide whether a research request is specific enough to start research. \
         Today's date is {}.\n\
         Ask a clarifying question only if the request is ambiguous, uses acronyms or jargon \
         you cannot resolve, or lacks scope needed for useful research. Never ask for \
         information the user already gave.\n\
         Reply with a JSON object: {{\"need_clarification\": bool, \"question\": string, \
         \"verification\": string}}. When no clarification is needed leave \"question\" empty and \
         put a short acknowledgement that research is starting in \"verification\".",
        today()
    )
}

pub(crate) fn brief_system() -> String {
    format!(
        "Turn the conversation into a research brief. Today's date is {}.\n\
         Keep every detail the user gave, state unknown dimensions as open rather than \
         inventing them, and write the brief in the first person from the user's side.\n\
         Reply with a JSON object: {{\"research_brief\": string, \"scope\": string or null, \
         \"timeframe\": string or null, \"entities\": [string]}}.",
        today()
    )
}

pub(crate) fn supervisor_system(max_topics: usize, pass: usize, max_passes: usize) -> String {
    format!(
        "You lead a research team. Today's date is {}.\n\
         Split the remaining gaps of the brief into at most {} independent sub-topics and hand \
         them to researchers with the `delegate` tool. Each topic must stand alone: researchers \
         cannot see each other's work. Do not repeat topics that are already covered.\n\
         Call `complete` when the findings answer the brief. This is planning pass {} of {}.",
        today(),
        max_topics,
        pass,
        max_passes
    )
}

pub(crate) fn supervisor_user(
    brief: &ResearchBrief,
    covered: &[String],
    failed: &[String],
    findings: &str,
) -> String {
    let mut out = format!("Research brief:\n{}\n", brief.render());
    if covered.is_empty() && failed.is_empty() {
        out.push_str("\nNo topics have been researched yet.\n");
    } else if !covered.is_empty() {
        out.push_str("\nTopics already researched:\n");
        for topic in covered {
            out.push_str("- ");
            out.push_str(topic);
            out.push('\n');
        }
    }
    if !failed.is_empty() {
        out.push_str("\nTopics that failed and may be delegated again:\n");
        for topic in failed {
            out.push_str("- ");
            out.push_str(topic);
            out.push('\n');
        }
    }
    if !findings.is_empty() {
        out.push_str("\nFindings so far:\n");
        out.push_str(findings);
    }
    out
}

pub(crate) fn researcher_system(iteration: usize, max_iterations: usize) -> String {
    format!(
        "You are researching one sub-topic with a web search tool. Today's date is {}.\n\
         After each search, use the `reflect` tool: say what you found, what is still missing, \
         and whether another search is worth it. Choose \"stop\" once you can answer \
         confidently or the last searches returned nothing new; otherwise choose \"continue\" \
         and give a sharper `next_query`.\n\
         This was search {} of at most {}.",
        today(),
        iteration,
        max_iterations
    )
}

pub(crate) fn researcher_user(
    brief: &ResearchBrief,
    topic: &str,
    query: &str,
    new_results: usize,
    notes: &str,
) -> String {
    format!(
        "Overall brief:\n{}\n\nYour sub-topic: {}\nLast query: {}\nNew sources from it: {}\n\n\
         Findings so far:\n{}",
        brief.render(),
        topic,
        query,
        new_results,
        if notes.is_empty() { "(none)\n" } else { notes }
    )
}

pub(crate) fn summarize_system(max_chars: usize) -> String {
    format!(
        "You condense a web page into notes for a researcher. Today's date is {}.\n\
         Keep facts, figures, dates, and named sources; drop navigation, ads, and boilerplate. \
         Stay under {} characters in total.\n\
         Reply with a JSON object: {{\"summary\": string, \"key_excerpts\": string}}, where \
         \"key_excerpts\" quotes up to five short passages verbatim.",
        today(),
        max_chars
    )
}

pub(crate) fn summarize_user(title: &str, url: &str, content: &str) -> String {
    format!("Title: {}\nURL: {}\n\nPage content:\n{}", title, url, content)
}

pub(crate) fn synthesis_system(citations: usize, token_budget: usize) -> String {
    format!(
        "You write the final research report from merged findings. Today's date is {}.\n\
         Write well-organised Markdown with `##` section headings that answers the brief. \
         Use only the findings given. Cite every claim with the bracketed source numbers used \
         in the findings, [1] to [{}], and never invent new numbers. Do not add a title, a \
         sources list, or a completeness section; those are appended for you. Stay under \
         about {} tokens.",
        today(),
        citations,
        token_budget
    )
}

pub(crate) fn synthesis_user(brief: &ResearchBrief, merged: &str) -> String {
    format!(
        "Research brief:\n{}\n\nMerged findings with their sources:\n\n{}",
        brief.render(),
        merged
    )
}
