//! The CommonJS-style wrapper contract.

/// Wrap raw module text in a function providing the stable locals
/// `module`, `exports`, `require`, `__filename`, `__dirname`. Evaluating the
/// wrapped text yields the wrapper function itself, which the caller then
/// invokes with those five arguments.
pub fn wrap_source(raw: &str) -> String {
    format!("(function(module, exports, require, __filename, __dirname) {{\n{raw}\n}})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_with_stable_parameter_list() {
        let wrapped = wrap_source("exports.value = 1;");
        assert!(wrapped.starts_with("(function(module, exports, require, __filename, __dirname) {"));
        assert!(wrapped.contains("exports.value = 1;"));
        assert!(wrapped.trim_end().ends_with("})"));
    }
}
