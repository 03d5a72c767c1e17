//! Turning a user GStreamer description into one that ends in an RGB appsink.

/// Name of the appsink added when the description has none.
pub const APPSINK_NAME: &str = "frames";

/// Byte offset of the last top-level `!` link, ignoring `!` inside quotes.
fn last_link(description: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut last = None;
    for (i, c) in description.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '!') => last = Some(i),
            _ => {}
        }
    }
    last
}

/// Does the description already finish in an `appsink` element?
pub fn ends_in_appsink(description: &str) -> bool {
    let tail = match last_link(description) {
        Some(i) => &description[i + 1..],
        None => description,
    };
    tail.split_whitespace().next() == Some("appsink")
}

/// Launch description whose sink delivers packed RGB frames.
///
/// A trailing `appsink` is kept with its properties and preceded by a conversion to
/// RGB, so it keeps the size the pipeline negotiated. Otherwise the frames are
/// scaled to `frame_size` and a named appsink is appended.
pub fn launch_description(description: &str, frame_size: (u32, u32)) -> String {
    let description = description.trim().trim_end_matches('!').trim_end();

    if ends_in_appsink(description) {
        return match last_link(description) {
            Some(i) => format!(
                "{} ! videoconvert ! video/x-raw,format=RGB ! {}",
                description[..i].trim_end(),
                description[i + 1..].trim_start()
            ),
            None => description.to_string(),
        };
    }

    let (width, height) = frame_size;
    format!(
        "{description} ! videoconvert ! videoscale ! \
         video/x-raw,format=RGB,width={width},height={height} ! \
         appsink name={APPSINK_NAME} sync=false"
    )
}
