//! Init command implementation.

use anyhow::{Context, Result};
use sandbox_host::{SandboxConfig, DEFAULT_CONFIG_FILE};
use std::fs;
use std::path::{Path, PathBuf};

const STARTER_FILE: &str = "App.jsx";

const STARTER_APP: &str = r#"import React from 'react';
import {
  Heading,
  BodyLong,
  Button,
  Alert,
  Box,
  HStack,
  VStack,
} from "@navikt/ds-react";

export default function App() {
  const [count, setCount] = React.useState(0);

  return (
    <Box padding="8" style={{ height: '100%' }}>
      <VStack gap="4">
        <Heading size="large">Custom Sandbox</Heading>
        <BodyLong>
          All NAV Design System components are instantly available!
          No download wait time.
        </BodyLong>

        <Alert variant="info">
          Click the button below to test interactivity
        </Alert>

        <HStack gap="4">
          <Button onClick={() => setCount(count + 1)}>
            Clicked {count} times
          </Button>
          <Button variant="secondary" onClick={() => setCount(0)}>
            Reset
          </Button>
        </HStack>
      </VStack>
    </Box>
  );
}
"#;

/// Initialize a new sandbox project
pub fn init_project(path: Option<&Path>) -> Result<()> {
    let root = path.unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(root).with_context(|| format!("Failed to create {:?}", root))?;

    write_config(root)?;
    write_if_missing(&root.join(STARTER_FILE), STARTER_APP)?;

    println!("✓ sandbox initialized in {:?}", root);
    println!("  - Edit {} and run `sandbox watch` to see it live", STARTER_FILE);
    Ok(())
}

fn write_config(root: &Path) -> Result<()> {
    let mut config = SandboxConfig::default();
    config.source = Some(PathBuf::from(STARTER_FILE));
    let yaml = serde_yaml::to_string(&config).context("Failed to serialize default config")?;
    write_if_missing(&root.join(DEFAULT_CONFIG_FILE), &yaml)
}

fn write_if_missing(path: &Path, contents: &str) -> Result<()> {
    if path.exists() {
        println!("{:?} already exists", path);
        return Ok(());
    }
    fs::write(path, contents).with_context(|| format!("Failed to write {:?}", path))?;
    println!("Created {:?}", path);
    Ok(())
}
