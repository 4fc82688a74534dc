use crate::models::chat::{ ChatMessage, Role };

pub const MAX_HISTORY_PAIRS: usize = 15;

/// Bounds a transcript before it is persisted or sent to the model.
///
/// System messages always survive, as does the trailing user message that
/// is still waiting for a reply. A user message directly followed by
/// another user message is collapsed into the later one. Of the remaining
/// user/assistant pairs only the `max_pairs` most recent are kept.
pub fn trim_history(messages: &[ChatMessage], max_pairs: usize) -> Vec<ChatMessage> {
    let collapsed = collapse_consecutive_users(messages);
    keep_recent_pairs(&collapsed, max_pairs)
}

fn collapse_consecutive_users(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    messages
        .iter()
        .enumerate()
        .filter(|(i, msg)| {
            let next_is_user = messages
                .get(i + 1)
                .map(|next| next.role == Role::User)
                .unwrap_or(false);
            !(msg.role == Role::User && next_is_user)
        })
        .map(|(_, msg)| msg.clone())
        .collect()
}

fn keep_recent_pairs(messages: &[ChatMessage], max_pairs: usize) -> Vec<ChatMessage> {
    let mut keep = vec![false; messages.len()];

    let trailing_user = messages
        .iter()
        .rposition(|m| m.role != Role::System)
        .filter(|&i| messages[i].role == Role::User);
    if let Some(i) = trailing_user {
        keep[i] = true;
    }

    let mut pairs = 0;
    let mut pending_reply: Option<usize> = None;
    for (i, msg) in messages.iter().enumerate().rev() {
        match msg.role {
            Role::System => {
                keep[i] = true;
            }
            Role::Assistant => {
                // An earlier unmatched reply is an orphan and gets dropped.
                pending_reply = Some(i);
            }
            Role::User if Some(i) == trailing_user => {}
            Role::User => {
                if let Some(reply) = pending_reply.take() {
                    if pairs < max_pairs {
                        keep[i] = true;
                        keep[reply] = true;
                        pairs += 1;
                    }
                }
            }
        }
    }

    messages
        .iter()
        .zip(keep)
        .filter_map(|(msg, kept)| kept.then(|| msg.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: Role, content: &str) -> ChatMessage {
        ChatMessage { role, content: content.to_string(), timestamp: 0 }
    }

    fn contents(messages: &[ChatMessage]) -> Vec<&str> {
        messages.iter().map(|m| m.content.as_str()).collect()
    }

    fn long_transcript(pairs: usize) -> Vec<ChatMessage> {
        let mut messages = vec![msg(Role::System, "sys")];
        for i in 0..pairs {
            messages.push(msg(Role::User, &format!("q{}", i)));
            messages.push(msg(Role::Assistant, &format!("a{}", i)));
        }
        messages
    }

    #[test]
    fn collapses_redundant_user_and_keeps_trailing() {
        let input = vec![
            msg(Role::System, "sys"),
            msg(Role::User, "A"),
            msg(Role::User, "B"),
            msg(Role::Assistant, "R1"),
            msg(Role::User, "C")
        ];
        let out = trim_history(&input, MAX_HISTORY_PAIRS);
        assert_eq!(contents(&out), vec!["sys", "B", "R1", "C"]);
    }

    #[test]
    fn keeps_only_most_recent_pairs() {
        let input = long_transcript(20);
        let out = trim_history(&input, MAX_HISTORY_PAIRS);

        assert_eq!(out.len(), 1 + 2 * MAX_HISTORY_PAIRS);
        assert_eq!(out[0].content, "sys");
        assert_eq!(out[1].content, "q5");
        assert_eq!(out.last().unwrap().content, "a19");
    }

    #[test]
    fn trailing_user_survives_full_budget() {
        let mut input = long_transcript(MAX_HISTORY_PAIRS);
        input.push(msg(Role::User, "pending"));
        let out = trim_history(&input, MAX_HISTORY_PAIRS);

        assert_eq!(out.len(), 2 + 2 * MAX_HISTORY_PAIRS);
        assert_eq!(out.last().unwrap().content, "pending");
    }

    #[test]
    fn trailing_user_survives_zero_budget() {
        let input = vec![
            msg(Role::User, "q"),
            msg(Role::Assistant, "a"),
            msg(Role::User, "pending")
        ];
        let out = trim_history(&input, 0);
        assert_eq!(contents(&out), vec!["pending"]);
    }

    #[test]
    fn ending_on_assistant_needs_no_special_case() {
        let input = long_transcript(3);
        assert_eq!(trim_history(&input, MAX_HISTORY_PAIRS), input);
    }

    #[test]
    fn system_messages_kept_in_order() {
        let input = vec![
            msg(Role::System, "s1"),
            msg(Role::User, "q0"),
            msg(Role::Assistant, "a0"),
            msg(Role::System, "s2"),
            msg(Role::User, "q1"),
            msg(Role::Assistant, "a1")
        ];
        let out = trim_history(&input, 1);
        assert_eq!(contents(&out), vec!["s1", "s2", "q1", "a1"]);
    }

    #[test]
    fn pair_may_span_a_system_message() {
        let input = vec![
            msg(Role::User, "q"),
            msg(Role::System, "note"),
            msg(Role::Assistant, "a")
        ];
        assert_eq!(contents(&trim_history(&input, 1)), vec!["q", "note", "a"]);
    }

    #[test]
    fn orphan_assistant_is_dropped() {
        let input = vec![
            msg(Role::Assistant, "greeting"),
            msg(Role::User, "q"),
            msg(Role::Assistant, "a")
        ];
        assert_eq!(contents(&trim_history(&input, 5)), vec!["q", "a"]);
    }

    #[test]
    fn never_leaves_unjustified_consecutive_users() {
        let input = vec![
            msg(Role::User, "a"),
            msg(Role::User, "b"),
            msg(Role::User, "c"),
            msg(Role::Assistant, "r"),
            msg(Role::User, "d"),
            msg(Role::User, "e")
        ];
        let out = trim_history(&input, MAX_HISTORY_PAIRS);
        assert_eq!(contents(&out), vec!["c", "r", "e"]);
        for window in out.windows(2) {
            assert!(!(window[0].role == Role::User && window[1].role == Role::User));
        }
    }

    #[test]
    fn trimming_is_idempotent() {
        let mut input = long_transcript(18);
        input.insert(5, msg(Role::User, "dup"));
        input.push(msg(Role::User, "pending"));

        let once = trim_history(&input, MAX_HISTORY_PAIRS);
        let twice = trim_history(&once, MAX_HISTORY_PAIRS);
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_transcript_stays_empty() {
        assert!(trim_history(&[], MAX_HISTORY_PAIRS).is_empty());
    }
}
