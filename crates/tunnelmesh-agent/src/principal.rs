//! Proxy identity from certificate principals

/// Get the proxy id from the principals of a proxy's certificate.
///
/// The id is always the first principal, in the form `<id>.<cluster-name>`;
/// a principal without a `.` is the id itself. No validation is done on the
/// id. Returns `None` only when there are no principals.
pub fn proxy_id_from_principals<S: AsRef<str>>(principals: &[S]) -> Option<&str> {
    let principal = principals.first()?.as_ref();

    Some(principal.split_once('.').map_or(principal, |(id, _)| id))
}

/// Get the connected proxy set from the certificate principals of each proxy
/// connection, in connection order.
///
/// Connections that carry no principals are skipped.
pub fn proxy_ids_from_principals<S: AsRef<str>>(connections: &[Vec<S>]) -> Vec<String> {
    connections
        .iter()
        .filter_map(|principals| proxy_id_from_principals(principals))
        .map(str::to_string)
        .collect()
}
