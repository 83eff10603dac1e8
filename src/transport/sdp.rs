//! Direction policy applied to SDP text.
//!
//! Some transport implementations leave a media section without any
//! direction attribute, and peers then disagree on what it means. Every
//! `m=` section of an answer we commit carries an explicit direction.

use super::Direction;

/// Direction declared by each `m=` section, in order. Sections without a
/// direction attribute report [`Direction::Unspecified`].
pub fn media_directions(sdp: &str) -> Vec<Direction> {
    let mut directions = Vec::new();
    for line in sdp.lines() {
        let line = line.trim_end_matches('\r');
        if line.starts_with("m=") {
            directions.push(Direction::Unspecified);
        } else if let Some(attribute) = line.strip_prefix("a=") {
            if let (Some(current), Some(direction)) =
                (directions.last_mut(), Direction::from_attribute(attribute))
            {
                *current = direction;
            }
        }
    }
    directions
}

/// Appends `a=<fallback>` to every media section that lacks a direction.
///
/// Returns the rewritten SDP and the number of sections that were changed.
/// Line endings follow the input (`\r\n` unless the input uses bare `\n`).
pub fn default_unset_directions(sdp: &str, fallback: Direction) -> (String, usize) {
    let Some(attribute) = fallback.as_attribute() else {
        return (sdp.to_string(), 0);
    };
    let eol = if sdp.contains("\r\n") || !sdp.contains('\n') { "\r\n" } else { "\n" };

    let mut out: Vec<String> = Vec::new();
    let mut in_media = false;
    let mut has_direction = false;
    let mut fixed = 0;

    let mut close_section = |out: &mut Vec<String>, in_media: bool, has_direction: bool| {
        if in_media && !has_direction {
            out.push(format!("a={}", attribute));
            fixed += 1;
        }
    };

    for line in sdp.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        if line.starts_with("m=") {
            close_section(&mut out, in_media, has_direction);
            in_media = true;
            has_direction = false;
        } else if let Some(attr) = line.strip_prefix("a=") {
            if Direction::from_attribute(attr).is_some() {
                has_direction = true;
            }
        }
        out.push(line.to_string());
    }
    close_section(&mut out, in_media, has_direction);

    let mut rewritten = out.join(eol);
    if !rewritten.is_empty() {
        rewritten.push_str(eol);
    }
    (rewritten, fixed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANSWER: &str = "v=0\r\n\
o=- 1 2 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 0\r\n\
c=IN IP4 0.0.0.0\r\n\
a=mid:0\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 96\r\n\
c=IN IP4 0.0.0.0\r\n\
a=mid:1\r\n\
a=sendonly\r\n";

    #[test]
    fn test_media_directions_per_section() {
        assert_eq!(
            media_directions(ANSWER),
            vec![Direction::Unspecified, Direction::SendOnly]
        );
    }

    #[test]
    fn test_unset_direction_defaults_to_recvonly() {
        let (fixed_sdp, fixed) = default_unset_directions(ANSWER, Direction::RecvOnly);
        assert_eq!(fixed, 1);
        assert_eq!(
            media_directions(&fixed_sdp),
            vec![Direction::RecvOnly, Direction::SendOnly]
        );
        assert!(fixed_sdp.contains("a=mid:0\r\na=recvonly\r\nm=video"));
        assert!(fixed_sdp.ends_with("a=sendonly\r\n"));
    }

    #[test]
    fn test_explicit_directions_are_untouched() {
        let sdp = "v=0\r\nm=audio 9 RTP/AVP 0\r\na=sendrecv\r\n";
        let (fixed_sdp, fixed) = default_unset_directions(sdp, Direction::RecvOnly);
        assert_eq!(fixed, 0);
        assert_eq!(fixed_sdp, sdp);
    }

    #[test]
    fn test_session_level_direction_does_not_count_for_media() {
        let sdp = "v=0\na=sendrecv\nm=audio 9 RTP/AVP 0\n";
        let (fixed_sdp, fixed) = default_unset_directions(sdp, Direction::RecvOnly);
        assert_eq!(fixed, 1);
        assert_eq!(fixed_sdp, "v=0\na=sendrecv\nm=audio 9 RTP/AVP 0\na=recvonly\n");
    }

    #[test]
    fn test_unspecified_fallback_is_a_no_op() {
        let (fixed_sdp, fixed) = default_unset_directions(ANSWER, Direction::Unspecified);
        assert_eq!(fixed, 0);
        assert_eq!(fixed_sdp, ANSWER);
    }
}
