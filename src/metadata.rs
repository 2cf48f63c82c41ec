//! Metadata Validator.

use crate::errors::RegistryError;
use crate::name;
use serde_json::Value;

/// How the package name embedded in `info` should be reconciled with the
/// catalog's own idea of the package's name.
pub enum NameCheck<'a> {
    /// Admitting to an existing package: `info.name` (lowercased) must equal
    /// this.
    MustMatch(&'a str),
    /// Creating a brand new package: whatever `info.name` says, becomes the
    /// name (after lowercasing and validating).
    Supply,
}

/// Validate a fetched package description: object shape, required fields,
/// name reconciliation, dependency key legality, and tag/version agreement.
///
/// `tag_version`, when `Some`, is the release tag with its leading `v`
/// stripped — only release refs carry this check (step 5); branch refs pass
/// `None`.
///
/// Returns the normalized (lowercase) package name on success.
pub fn validate(
    info: &Value,
    name_check: NameCheck,
    tag_version: Option<&str>,
) -> Result<String, RegistryError> {
    // 1. must be an object.
    let obj = info.as_object().ok_or(RegistryError::MalformedDescription)?;

    // 2. license + description non-empty.
    let license = obj.get("license").and_then(Value::as_str).unwrap_or("");
    if license.is_empty() {
        return Err(RegistryError::MissingRequiredField {
            name: obj
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            field: "license",
        });
    }
    let description = obj.get("description").and_then(Value::as_str).unwrap_or("");
    if description.is_empty() {
        return Err(RegistryError::MissingRequiredField {
            name: obj
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            field: "description",
        });
    }

    // 3. normalize + reconcile name.
    let info_name = obj
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| RegistryError::MissingRequiredField {
            name: String::new(),
            field: "name",
        })?
        .to_lowercase();
    name::validate(&info_name)?;
    match name_check {
        NameCheck::MustMatch(expected) => {
            if info_name != expected {
                return Err(RegistryError::MissingRequiredField {
                    name: expected.to_string(),
                    field: "name",
                });
            }
        }
        NameCheck::Supply => {}
    }

    // 4. dependency keys must satisfy the name grammar (each `:`-segment).
    if let Some(deps) = obj.get("dependencies").and_then(Value::as_object) {
        for key in deps.keys() {
            name::validate_dependency_key(key)?;
        }
    }

    // 5. for release refs, info.version (if present) must equal the
    //    `v`-stripped tag.
    if let Some(expected_tag_version) = tag_version {
        if let Some(info_version) = obj.get("version").and_then(Value::as_str) {
            if info_version != expected_tag_version {
                return Err(RegistryError::VersionMismatch {
                    tag: expected_tag_version.to_string(),
                    info: info_version.to_string(),
                });
            }
        }
    }

    Ok(info_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_info() -> Value {
        json!({
            "name": "Foo",
            "license": "MIT",
            "description": "x",
        })
    }

    #[test]
    fn accepts_well_formed_info_for_new_package() {
        let name = validate(&valid_info(), NameCheck::Supply, None).unwrap();
        assert_eq!(name, "foo");
    }

    #[test]
    fn rejects_non_object() {
        assert!(matches!(
            validate(&json!("not an object"), NameCheck::Supply, None),
            Err(RegistryError::MalformedDescription)
        ));
    }

    #[test]
    fn rejects_missing_license() {
        let info = json!({"name": "foo", "description": "x"});
        assert!(matches!(
            validate(&info, NameCheck::Supply, None),
            Err(RegistryError::MissingRequiredField { field: "license", .. })
        ));
    }

    #[test]
    fn rejects_missing_description() {
        let info = json!({"name": "foo", "license": "MIT"});
        assert!(matches!(
            validate(&info, NameCheck::Supply, None),
            Err(RegistryError::MissingRequiredField { field: "description", .. })
        ));
    }

    #[test]
    fn rejects_name_mismatch() {
        assert!(matches!(
            validate(&valid_info(), NameCheck::MustMatch("bar"), None),
            Err(RegistryError::MissingRequiredField { field: "name", .. })
        ));
    }

    #[test]
    fn rejects_illegal_dependency_key() {
        let mut info = valid_info();
        info["dependencies"] = json!({"bad key": "1.0"});
        assert!(matches!(
            validate(&info, NameCheck::Supply, None),
            Err(RegistryError::InvalidName(_))
        ));
    }

    #[test]
    fn accepts_scoped_dependency_key() {
        let mut info = valid_info();
        info["dependencies"] = json!({"org:pkg": "1.0"});
        assert!(validate(&info, NameCheck::Supply, None).is_ok());
    }

    #[test]
    fn rejects_version_mismatch_on_release_ref() {
        let mut info = valid_info();
        info["version"] = json!("0.2.0");
        assert!(matches!(
            validate(&info, NameCheck::Supply, Some("0.1.0")),
            Err(RegistryError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn accepts_matching_version_on_release_ref() {
        let mut info = valid_info();
        info["version"] = json!("0.1.0");
        assert!(validate(&info, NameCheck::Supply, Some("0.1.0")).is_ok());
    }

    #[test]
    fn branch_refs_skip_version_check() {
        let mut info = valid_info();
        info["version"] = json!("9.9.9");
        assert!(validate(&info, NameCheck::Supply, None).is_ok());
    }
}
