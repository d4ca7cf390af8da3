use super::*;

fn policy_with_root(root: &Path) -> Policy {
    Policy { allowed_paths: vec![root.to_path_buf()], ..Default::default() }
}

#[test]
fn allows_reads_under_an_allowed_root() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("notes.txt");
    std::fs::write(&file, "hi").unwrap();
    let policy = policy_with_root(dir.path());
    assert!(policy.check_read_path(&file).is_ok());
}

#[test]
fn denies_reads_outside_allowed_roots() {
    let dir = tempfile::tempdir().unwrap();
    let outside = tempfile::tempdir().unwrap();
    let file = outside.path().join("notes.txt");
    std::fs::write(&file, "hi").unwrap();
    let policy = policy_with_root(dir.path());
    assert!(matches!(policy.check_read_path(&file), Err(ToolError::PolicyPathDenied(_))));
}

#[test]
fn always_denies_sensitive_files_even_inside_an_allowed_root() {
    let dir = tempfile::tempdir().unwrap();
    let ssh_dir = dir.path().join(".ssh");
    std::fs::create_dir_all(&ssh_dir).unwrap();
    let key = ssh_dir.join("id_rsa");
    std::fs::write(&key, "secret").unwrap();
    let policy = policy_with_root(dir.path());
    assert!(matches!(policy.check_read_path(&key), Err(ToolError::SensitiveFileDenied(_))));
}

#[test]
fn env_file_is_always_denied() {
    let dir = tempfile::tempdir().unwrap();
    let env = dir.path().join(".env");
    std::fs::write(&env, "SECRET=1").unwrap();
    let policy = policy_with_root(dir.path());
    assert!(matches!(policy.check_read_path(&env), Err(ToolError::SensitiveFileDenied(_))));
}

#[test]
fn readonly_overlay_blocks_writes_but_not_reads() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("config.toml");
    std::fs::write(&file, "a = 1").unwrap();
    let mut policy = policy_with_root(dir.path());
    policy.readonly_paths.push(dir.path().to_path_buf());
    assert!(policy.check_read_path(&file).is_ok());
    assert!(matches!(policy.check_write_path(&file), Err(ToolError::PolicyPathDenied(_))));
}

#[test]
fn writable_paths_restrict_the_write_subset_of_allowed_paths() {
    let dir = tempfile::tempdir().unwrap();
    let writable = dir.path().join("scratch");
    std::fs::create_dir_all(&writable).unwrap();
    let outside_file = dir.path().join("readonly.txt");
    std::fs::write(&outside_file, "a").unwrap();
    let inside_file = writable.join("out.txt");
    std::fs::write(&inside_file, "a").unwrap();

    let mut policy = policy_with_root(dir.path());
    policy.writable_paths.push(writable.clone());

    assert!(policy.check_write_path(&inside_file).is_ok());
    assert!(matches!(policy.check_write_path(&outside_file), Err(ToolError::PolicyPathDenied(_))));
}

#[test]
fn allows_a_command_whose_basename_is_listed() {
    let policy = Policy { allowed_commands: vec!["git".to_string()], ..Default::default() };
    assert!(policy.check_command("/usr/bin/git status").is_ok());
}

#[test]
fn denies_a_command_not_in_the_allowlist() {
    let policy = Policy { allowed_commands: vec!["git".to_string()], ..Default::default() };
    assert!(matches!(policy.check_command("rm -rf /"), Err(ToolError::PolicyCommandDenied(_))));
}

#[test]
fn parses_quoted_leading_command_tokens() {
    let policy = Policy { allowed_commands: vec!["my tool".to_string()], ..Default::default() };
    assert!(policy.check_command("\"/usr/local/bin/my tool\" --flag").is_ok());
}

#[test]
fn single_quoted_leading_token_is_also_recognised() {
    let policy = Policy { allowed_commands: vec!["git".to_string()], ..Default::default() };
    assert!(policy.check_command("'/usr/bin/git' log").is_ok());
}

#[test]
fn denies_an_endpoint_not_on_the_allowlist() {
    let policy = Policy { allowed_endpoints: vec!["api.example.com".to_string()], ..Default::default() };
    assert!(matches!(
        policy.check_endpoint("https://evil.example.com/"),
        Err(ToolError::PolicyEndpointDenied(_))
    ));
}

#[test]
fn rejects_non_http_schemes() {
    let policy = Policy { allowed_endpoints: vec!["example.com".to_string()], ..Default::default() };
    assert!(matches!(policy.check_endpoint("file:///etc/passwd"), Err(ToolError::PolicyEndpointDenied(_))));
}

#[test]
fn flags_loopback_literal_as_ssrf_even_when_allowlisted() {
    let policy = Policy { allowed_endpoints: vec!["127.0.0.1".to_string()], ..Default::default() };
    assert!(matches!(policy.check_endpoint("http://127.0.0.1/admin"), Err(ToolError::Ssrf(_))));
}

#[test]
fn flags_private_range_literal_as_ssrf() {
    let policy = Policy { allowed_endpoints: vec!["10.0.0.5".to_string()], ..Default::default() };
    assert!(matches!(policy.check_endpoint("http://10.0.0.5/"), Err(ToolError::Ssrf(_))));
}
