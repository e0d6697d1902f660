use {
    anyhow::Result,
    bytes::Bytes,
    filegate_protocol::{ENCRYPTED_PAYLOAD_FIELD, FileId, Visibility, endpoints::FileList},
    filegate_sdk::crypto::Payload,
    filegate_tests::{PASSWORD, TestServer, USERNAME, codec, serve_content, status_of},
    serde_json::{Value, json},
};

fn id(s: &str) -> FileId {
    s.parse().unwrap()
}

fn content(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn login_and_sessions() -> Result<()> {
    let server = TestServer::plaintext().await?;

    let anonymous = server.client()?;
    let err = anonymous.list(None, false).await.unwrap_err();
    assert_eq!(status_of(&err), Some(401));
    let err = anonymous.me().await.unwrap_err();
    assert_eq!(status_of(&err), Some(401));

    let raw = reqwest::get(server.path_url("/api/files")?).await?;
    assert_eq!(raw.status(), 401);
    assert_eq!(raw.headers()["www-authenticate"], "Bearer");
    let body: Value = raw.json().await?;
    assert_eq!(body["detail"], "Not authenticated");

    let mut client = server.client()?;
    let err = client.login(USERNAME, "wrong").await.unwrap_err();
    assert_eq!(status_of(&err), Some(401));
    let err = client.login("someone", PASSWORD).await.unwrap_err();
    assert_eq!(status_of(&err), Some(401));

    let login = client.login(USERNAME, PASSWORD).await?;
    assert_eq!(login.token_type, "bearer");
    assert_eq!(login.expires_in, 3600);
    assert_eq!(client.me().await?.username, USERNAME);
    assert_eq!(
        client.logout().await?.message,
        "Successfully logged out"
    );

    let forged = server
        .client()?
        .with_token(filegate_protocol::AccessToken::new("forged.token.value".into()));
    let err = forged.me().await.unwrap_err();
    assert_eq!(status_of(&err), Some(401));

    let root: Value = reqwest::get(server.url.clone()).await?.json().await?;
    assert_eq!(root, json!({"message": "File Storage API"}));
    let missing = reqwest::get(server.path_url("/nope")?).await?;
    assert_eq!(missing.status(), 404);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn method_is_checked_before_file_id() -> Result<()> {
    let server = TestServer::plaintext().await?;
    let client = server.logged_in(server.client()?).await?;
    let token = client.token().unwrap().as_unmasked_str().to_owned();
    let http = reqwest::Client::new();

    for path in ["/api/download/a%2Fb", "/api/files/a%2Fb", "/api/rename/a%5Cb"] {
        let response = http
            .put(server.path_url(path)?)
            .bearer_auth(&token)
            .send()
            .await?;
        assert_eq!(response.status(), 405, "{path}");
    }
    let response = http
        .get(server.path_url("/api/download/a%2Fb")?)
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(response.status(), 400);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn plaintext_file_lifecycle() -> Result<()> {
    let server = TestServer::plaintext().await?;
    let client = server.logged_in(server.client()?).await?;
    let data = content(100_000);

    let uploaded = client
        .upload_bytes(&data, Some(id("a.bin")), Visibility::Private, Some("orig.bin"), false)
        .await?;
    assert_eq!(uploaded.object_path, "private/a.bin");
    assert_eq!(uploaded.size, 100_000);
    assert!(!uploaded.is_public);
    assert_eq!(uploaded.original_filename.as_deref(), Some("orig.bin"));

    let err = client
        .upload_bytes(b"other", Some(id("a.bin")), Visibility::Private, None, false)
        .await
        .unwrap_err();
    assert_eq!(status_of(&err), Some(409));

    let direct = client
        .upload_direct(b"hello".to_vec(), "hello.txt", None, Visibility::Public, false)
        .await?;
    assert!(direct.is_public);
    assert_eq!(direct.size, 5);
    assert_eq!(direct.original_filename.as_deref(), Some("hello.txt"));
    // Generated ids are UUIDs.
    assert_eq!(direct.file_id.as_str().len(), 36);

    let files = client.list(None, false).await?;
    let paths: Vec<_> = files.iter().map(|f| f.object_path.clone()).collect();
    assert_eq!(
        paths,
        ["private/a.bin".to_owned(), format!("public/{}", direct.file_id)]
    );
    assert_eq!(client.list(Some(Visibility::Public), false).await?.len(), 1);

    assert_eq!(
        client.download(&id("a.bin"), Visibility::Private, false).await?,
        data
    );
    let err = client
        .download(&id("a.bin"), Visibility::Public, false)
        .await
        .unwrap_err();
    assert_eq!(status_of(&err), Some(404));

    let stat = client.stat(&id("a.bin"), Visibility::Private, false).await?;
    assert_eq!(stat.size, 100_000);

    let renamed = client
        .rename(&id("a.bin"), id("b c.bin"), Visibility::Private, false)
        .await?;
    assert_eq!(renamed.object_path, "private/b c.bin");
    let err = client
        .rename(&id("a.bin"), id("x"), Visibility::Private, false)
        .await
        .unwrap_err();
    assert_eq!(status_of(&err), Some(404));

    let shared = client.toggle_share(&id("b c.bin"), Visibility::Private).await?;
    assert!(!shared.was_public);
    assert!(shared.is_public);
    assert_eq!(shared.object_path, "public/b c.bin");
    assert_eq!(
        client.download(&id("b c.bin"), Visibility::Public, false).await?,
        data
    );

    let deleted = client.delete(&id("b c.bin"), Visibility::Public).await?;
    assert_eq!(deleted.message, "File b c.bin deleted successfully");
    let err = client
        .delete(&id("b c.bin"), Visibility::Public)
        .await
        .unwrap_err();
    assert_eq!(status_of(&err), Some(404));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn encrypted_transport() -> Result<()> {
    let server = TestServer::with_secret().await?;
    let client = server.logged_in(server.encrypting_client()?).await?;
    let data = content(50_000);

    let uploaded = client
        .upload_bytes(&data, Some(id("secret.bin")), Visibility::Private, None, true)
        .await?;
    assert_eq!(uploaded.size, 50_000);

    let direct = client
        .upload_direct(data.clone(), "form.bin", Some(id("form.bin")), Visibility::Public, true)
        .await?;
    assert_eq!(direct.original_filename.as_deref(), Some("form.bin"));
    assert!(direct.is_public);

    let files = client.list(None, true).await?;
    assert_eq!(files.len(), 2);
    assert_eq!(
        client.download(&id("secret.bin"), Visibility::Private, true).await?,
        data
    );
    assert_eq!(
        client.download(&id("form.bin"), Visibility::Public, false).await?,
        data
    );
    let renamed = client
        .rename(&id("secret.bin"), id("moved.bin"), Visibility::Private, true)
        .await?;
    assert_eq!(renamed.object_path, "private/moved.bin");

    // On the wire an encrypted response holds nothing but the envelope.
    let token = client.token().unwrap().as_unmasked_str().to_owned();
    let raw: Value = reqwest::Client::new()
        .get(server.path_url("/api/files?encrypted=true")?)
        .bearer_auth(&token)
        .send()
        .await?
        .json()
        .await?;
    let object = raw.as_object().unwrap();
    assert_eq!(object.len(), 1);
    let envelope = object[ENCRYPTED_PAYLOAD_FIELD].as_str().unwrap();
    let Payload::Structured(map) = codec().decrypt_payload(envelope)? else {
        panic!("expected structured payload");
    };
    let list: FileList = serde_json::from_value(Value::Object(map))?;
    assert_eq!(list.files.len(), 2);

    let plain: Value = reqwest::Client::new()
        .get(server.path_url("/api/files")?)
        .bearer_auth(&token)
        .send()
        .await?
        .json()
        .await?;
    assert!(plain.is_array());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_envelopes() -> Result<()> {
    let server = TestServer::with_secret().await?;
    let client = server.logged_in(server.encrypting_client()?).await?;
    let token = client.token().unwrap().as_unmasked_str().to_owned();

    let envelope = codec().encrypt_payload(
        json!({"file_data": "aGVsbG8=", "file_id": "t.txt"})
            .as_object()
            .unwrap()
            .clone(),
    )?;
    let mut tampered = envelope.as_str().to_owned().into_bytes();
    let middle = tampered.len() / 2;
    tampered[middle] = if tampered[middle] == b'A' { b'B' } else { b'A' };
    let tampered = String::from_utf8(tampered)?;

    let http = reqwest::Client::new();
    for body in [
        json!({ ENCRYPTED_PAYLOAD_FIELD: tampered }),
        json!({ ENCRYPTED_PAYLOAD_FIELD: "not base64!" }),
        json!({ ENCRYPTED_PAYLOAD_FIELD: "AAAA" }),
    ] {
        let response = http
            .post(server.path_url("/api/upload")?)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?;
        assert_eq!(response.status(), 400, "{body}");
        let detail: Value = response.json().await?;
        assert!(
            detail["detail"]
                .as_str()
                .unwrap()
                .starts_with("Failed to decrypt payload"),
            "{detail}"
        );
    }
    assert!(client.list(None, false).await?.is_empty());

    // The untouched envelope is accepted and the response is sealed too.
    let response: Value = http
        .post(server.path_url("/api/upload")?)
        .bearer_auth(&token)
        .json(&json!({ ENCRYPTED_PAYLOAD_FIELD: envelope }))
        .send()
        .await?
        .json()
        .await?;
    assert!(response.get(ENCRYPTED_PAYLOAD_FIELD).is_some());
    assert_eq!(
        client.download(&id("t.txt"), Visibility::Private, false).await?,
        b"hello"
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn without_server_key() -> Result<()> {
    let server = TestServer::plaintext().await?;
    let client = server.logged_in(server.encrypting_client()?).await?;

    let err = client
        .upload_bytes(b"x", Some(id("x")), Visibility::Private, None, true)
        .await
        .unwrap_err();
    assert_eq!(status_of(&err), Some(400));

    // Requested encryption degrades to plaintext.
    client
        .upload_bytes(b"x", Some(id("x")), Visibility::Private, None, false)
        .await?;
    assert_eq!(client.list(None, true).await?.len(), 1);
    assert_eq!(
        client.download(&id("x"), Visibility::Private, true).await?,
        b"x"
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn oversized_form_field() -> Result<()> {
    let server = TestServer::start(|config| {
        config.max_part_size = byte_size(1024);
    })
    .await?;
    let client = server.logged_in(server.client()?).await?;

    client
        .upload_direct(content(1024), "max.bin", Some(id("max")), Visibility::Private, false)
        .await?;
    let err = client
        .upload_direct(content(4096), "big.bin", Some(id("big")), Visibility::Private, false)
        .await
        .unwrap_err();
    assert_eq!(status_of(&err), Some(413));
    assert_eq!(client.list(None, false).await?.len(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn upload_from_url() -> Result<()> {
    let server = TestServer::start(|config| {
        config.max_file_size = byte_size(10_000);
    })
    .await?;
    let client = server.logged_in(server.client()?).await?;

    let data = content(10_000);
    let (url, _upstream) = serve_content(Bytes::from(data.clone())).await?;
    let uploaded = client
        .upload_url(url.as_str(), Some(id("fetched")), Visibility::Public, false)
        .await?;
    assert_eq!(uploaded.object_path, "public/fetched");
    assert_eq!(uploaded.size, 10_000);
    assert_eq!(
        client.download(&id("fetched"), Visibility::Public, false).await?,
        data
    );

    let (url, _upstream) = serve_content(Bytes::from(content(10_001))).await?;
    let err = client
        .upload_url(url.as_str(), Some(id("too big")), Visibility::Public, false)
        .await
        .unwrap_err();
    assert_eq!(status_of(&err), Some(413));

    let err = client
        .upload_url("ftp://example.com/a", None, Visibility::Public, false)
        .await
        .unwrap_err();
    assert_eq!(status_of(&err), Some(422));
    assert_eq!(client.list(None, false).await?.len(), 1);
    Ok(())
}

fn byte_size(bytes: u64) -> filegate_tests::filegate_server::config::Byte {
    filegate_tests::filegate_server::config::Byte::from_u64(bytes)
}
