// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

/// Converts a TOML file represented as a string to `S`
pub fn read_toml<S>(toml_string: &str) -> anyhow::Result<S>
where
    for<'de> S: serde::de::Deserialize<'de>,
{
    let new_struct: S = toml::from_str(toml_string)?;
    Ok(new_struct)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Deserialize)]
    struct Config {
        name: String,
    }

    #[test]
    fn read_toml_string() {
        let config: Config = read_toml("name = \"warcvault\"\n").unwrap();
        assert_eq!(config.name, "warcvault");
        assert!(read_toml::<Config>("name = ").is_err());
    }
}
