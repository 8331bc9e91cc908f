//! `quizforge cache reload [which]` (spec §6) — caches live inside the
//! running API process, so the CLI reaches them over the admin HTTP
//! surface rather than touching storage directly.

pub async fn reload(base_url: &str, admin_api_key: &str, which: Option<&str>) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let mut request = client.post(format!("{base_url}/api/v1/cache/reload")).header("x-api-key", admin_api_key);
    if let Some(which) = which {
        request = request.query(&[("which", which)]);
    }

    let response = request.send().await?;
    if !response.status().is_success() {
        anyhow::bail!("cache reload failed: {} {}", response.status(), response.text().await.unwrap_or_default());
    }
    println!("cache reload: {}", response.text().await?);
    Ok(())
}
