/// Clean HTML content using the ammonia library.
///
/// Whitelist-based: safe tags (like <b>, <p>) survive while <script>, <iframe>
/// and event-handler attributes are stripped. Question text comes from an
/// external store and passes through here before any participant sees it.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}
