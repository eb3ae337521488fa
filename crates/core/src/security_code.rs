use rand::Rng;

/// Issues verification codes for accepted travel requests.
///
/// A code is the requester's uppercased initials followed by a 5-digit random
/// number, matching `[A-Z]{2}\d{5}`. Codes are NOT guaranteed unique across
/// the table; a collision makes `find_by_security_code` return the oldest
/// match. Known risk, tolerated at this scale.
#[derive(Clone, Copy, Debug, Default)]
pub struct SecurityCodeIssuer;

impl SecurityCodeIssuer {
    pub fn issue(&self, first_name: &str, last_name: &str) -> String {
        let initials: String = [first_name, last_name]
            .iter()
            .filter_map(|name| name.chars().next())
            .flat_map(|ch| ch.to_uppercase())
            .collect();
        let random: u32 = rand::thread_rng().gen_range(10_000..=99_999);

        format!("{initials}{random}")
    }
}

#[cfg(test)]
mod tests {
    use super::SecurityCodeIssuer;

    fn assert_code_shape(code: &str, initials: &str) {
        assert_eq!(code.len(), 7, "code should be two initials plus five digits: {code}");
        assert_eq!(&code[..2], initials);
        let number: u32 = code[2..].parse().expect("suffix should be numeric");
        assert!((10_000..=99_999).contains(&number), "suffix out of range: {number}");
    }

    #[test]
    fn code_is_uppercased_initials_plus_five_digits() {
        let code = SecurityCodeIssuer.issue("maria", "santos");
        assert_code_shape(&code, "MS");
    }

    #[test]
    fn already_uppercase_names_are_preserved() {
        let code = SecurityCodeIssuer.issue("Juan", "Dela Cruz");
        assert_code_shape(&code, "JD");
    }
}
