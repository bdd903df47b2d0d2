//! UCS management API request bodies and response field extraction.
//!
//! The API speaks XML, but the filter only ever needs a handful of
//! attributes out of each response, so extraction is targeted regex
//! matching rather than full parsing. Call sites go through these
//! functions only; swapping in a strict XML parser would touch nothing
//! else.

use regex::Regex;
use std::sync::LazyLock;

static OUT_COOKIE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"outCookie="([^"]+)""#).unwrap());
static ERROR_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"errorCode="([^"]+)""#).unwrap());
static ASSIGNED_TO_DN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"assignedToDn="([^"]+)""#).unwrap());

/// `<aaaLogin>` request body.
pub fn aaa_login(username: &str, password: &str) -> String {
    format!(r#"<aaaLogin inName="{username}" inPassword="{password}"></aaaLogin>"#)
}

/// `<aaaRefresh>` request body; carries the old cookie as proof of identity.
pub fn aaa_refresh(username: &str, password: &str, cookie: &str) -> String {
    format!(
        r#"<aaaRefresh inName="{username}" inPassword="{password}" inCookie="{cookie}"></aaaRefresh>"#
    )
}

/// `<aaaLogout>` request body.
pub fn aaa_logout(cookie: &str) -> String {
    format!(r#"<aaaLogout inCookie="{cookie}"></aaaLogout>"#)
}

/// `<configResolveDn>` request body for a managed-object lookup.
pub fn config_resolve_dn(cookie: &str, dn: &str) -> String {
    format!(r#"<configResolveDn cookie="{cookie}" dn="{dn}"></configResolveDn>"#)
}

/// `<configResolveClass>` request body counting outstanding `faultInst`
/// objects for a device: cause equal, dn wildcard, severity *not* equal.
/// The inequality is deliberate — the caller gates on a cleared fault and
/// wants to know whether any other, still-active matching faults remain.
pub fn config_resolve_faults(cookie: &str, dn: &str, cause: &str, severity_ne: &str) -> String {
    format!(
        r#"<configResolveClass
    cookie="{cookie}"
    inHierarchical="false"
    classId="faultInst">
    <inFilter>
    <and>
        <eq class="faultInst"
            property="cause"
            value="{cause}" />
        <wcard class="faultInst"
            property="dn"
            value="{dn}" />
        <ne class="faultInst"
            property="severity"
            value="{severity_ne}" />
    </and>
    </inFilter>
</configResolveClass>"#
    )
}

/// Session cookie from a login or refresh response.
pub fn out_cookie(response: &str) -> Option<String> {
    OUT_COOKIE_RE
        .captures(response)
        .map(|c| c[1].to_string())
}

/// Non-empty error code from any API response.
pub fn error_code(response: &str) -> Option<String> {
    ERROR_CODE_RE.captures(response).map(|c| c[1].to_string())
}

/// Service profile dn a blade is assigned to. Absent or empty attribute
/// means "no profile", not a failure.
pub fn assigned_to_dn(response: &str) -> Option<String> {
    ASSIGNED_TO_DN_RE
        .captures(response)
        .map(|c| c[1].to_string())
}

/// Number of fault instances in a `configResolveClass` response.
pub fn fault_instance_count(response: &str) -> usize {
    response.matches("<faultInst").count()
}
