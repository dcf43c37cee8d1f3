//! Customer-facing messages for bank response codes

use serde::Serialize;

const GENERIC_MESSAGE: &str = "Ödeme işlemi başarısız oldu. Lütfen tekrar deneyiniz.";

fn known_message(code: &str) -> Option<&'static str> {
    let message = match code {
        "05" => "İşlem onaylanmadı. Lütfen bankanızla iletişime geçiniz.",
        "12" => "Geçersiz işlem.",
        "14" => "Geçersiz kart numarası.",
        "41" => "Kayıp kart. Lütfen bankanızla iletişime geçiniz.",
        "43" => "Çalıntı kart. Lütfen bankanızla iletişime geçiniz.",
        "51" => "Kart limitiniz yetersiz.",
        "54" => "Kartınızın son kullanma tarihi geçmiş.",
        "57" => "Kart sahibine bu işlem izni verilmemiş.",
        "58" => "Terminalin bu işlemi yapma yetkisi yok.",
        "62" => "Kısıtlı kart.",
        "65" => "Günlük işlem limiti aşıldı.",
        "75" => "Şifre deneme sayısı aşıldı.",
        "82" => "CVV hatalı veya 3D doğrulama başarısız.",
        "91" => "Bankanıza şu anda ulaşılamıyor. Lütfen daha sonra tekrar deneyiniz.",
        "96" => "Sistem hatası. Lütfen daha sonra tekrar deneyiniz.",
        _ => return None,
    };
    Some(message)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureMessage {
    pub code: Option<String>,
    pub message: String,
}

/// Message for a failed bank response.
///
/// Known codes map to a fixed text; otherwise the bank's own `msg` is used,
/// and without one a generic text carrying the raw code.
pub fn failure_message(code: Option<&str>, msg: Option<&str>) -> FailureMessage {
    let code = code.map(str::trim).filter(|c| !c.is_empty());
    let msg = msg.map(str::trim).filter(|m| !m.is_empty());

    let message = match (code.and_then(known_message), msg, code) {
        (Some(known), _, _) => known.to_string(),
        (None, Some(msg), _) => msg.to_string(),
        (None, None, Some(code)) => format!("{} (Hata kodu: {})", GENERIC_MESSAGE, code),
        (None, None, None) => GENERIC_MESSAGE.to_string(),
    };

    FailureMessage {
        code: code.map(str::to_string),
        message,
    }
}
