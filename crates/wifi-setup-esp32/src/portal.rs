//! `PortalServer` over the ESP-IDF HTTP server.

use esp_idf_svc::http::server::{Configuration, EspHttpServer};
use esp_idf_svc::http::Method;
use esp_idf_svc::io::{Read, Write};
use log::{info, warn};

use wifi_setup_server::{DriverError, PortalResponse, PortalServer, Provisioning};

fn server_error(err: impl std::fmt::Debug) -> DriverError {
    DriverError::Server(format!("{:?}", err))
}

/// Setup form server on the device's access point interface.
pub struct EspPortal {
    port: u16,
    server: Option<EspHttpServer<'static>>,
}

impl EspPortal {
    pub fn new(port: u16) -> Self {
        Self { port, server: None }
    }
}

impl PortalServer for EspPortal {
    fn start(&mut self, provisioning: Provisioning) -> Result<(), DriverError> {
        self.stop()?;

        let config = Configuration {
            http_port: self.port,
            ..Default::default()
        };
        let mut server = EspHttpServer::new(&config).map_err(server_error)?;

        let form = provisioning.clone();
        server
            .fn_handler::<anyhow::Error, _>("/", Method::Get, move |req| {
                let response = form.handle_get();
                let mut out = req.into_response(response.status, None, &response.headers())?;
                out.write_all(response.body.as_bytes())?;
                Ok(())
            })
            .map_err(server_error)?;

        let max_body = provisioning.max_body_bytes();
        server
            .fn_handler::<anyhow::Error, _>("/save", Method::Post, move |mut req| {
                // One byte past the limit so oversized bodies are detected.
                let mut body = vec![0u8; max_body + 1];
                let mut len = 0;
                while len < body.len() {
                    let read = req.read(&mut body[len..])?;
                    if read == 0 {
                        break;
                    }
                    len += read;
                }
                body.truncate(len);

                let response: PortalResponse = provisioning.respond_post_blocking(&body);
                if response.status != 200 {
                    warn!("Submission rejected with {}", response.status);
                }
                let mut out = req.into_response(response.status, None, &response.headers())?;
                out.write_all(response.body.as_bytes())?;
                Ok(())
            })
            .map_err(server_error)?;

        info!("Portal HTTP server listening on port {}", self.port);
        self.server = Some(server);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DriverError> {
        if self.server.take().is_some() {
            info!("Portal HTTP server stopped");
        }
        Ok(())
    }
}
