use crate::services::statistics::StatisticsSnapshot;

const ROLE: &str = "Você é um assistente de IA especializado em análise de ordens de serviço e estimativas de tempo.";

const INSTRUCTIONS: [&str; 8] = [
    "Responda perguntas sobre estimativas de tempo, prazos e análise de ordens de serviço",
    "Use os dados acima para fundamentar suas respostas",
    "Seja específico e prático",
    "Se não tiver dados suficientes, estime o tempo da melhor forma possível",
    "Mantenha respostas concisas e objetivas",
    "Responda em português brasileiro",
    "Mesmo que impreciso, forneça a melhor estimativa possível",
    "Trocar uma lâmpada leva em média 15 minutos",
];

/// Renders the statistics and the user's question into a single prompt.
///
/// The output depends only on its inputs.
pub fn build_prompt(stats: &StatisticsSnapshot, message: &str) -> String {
    let priority_stats = serde_json::to_string_pretty(&stats.priority_stats)
        .unwrap_or_else(|_| "{}".to_string());

    let mut prompt = String::new();
    prompt.push_str(ROLE);
    prompt.push_str("\n\nDADOS DO SISTEMA:\n");
    prompt.push_str(&format!(
        "- Total de ordens de serviço: {}\n",
        stats.total_orders
    ));
    prompt.push_str(&format!(
        "- Ordens do usuário atual: {}\n",
        stats.user_orders_count
    ));
    prompt.push_str(&format!(
        "- Ordens concluídas no sistema: {}\n",
        stats.completed_orders
    ));
    prompt.push_str(&format!(
        "- Média geral de dias para conclusão: {:.1} dias\n",
        stats.avg_completion_days
    ));
    prompt.push_str(&format!("- Ordens em atraso: {}\n", stats.delayed_count));
    prompt.push_str("\nESTATÍSTICAS POR PRIORIDADE:\n");
    prompt.push_str(&priority_stats);
    prompt.push_str("\n\nINSTRUÇÕES:\n");
    for instruction in INSTRUCTIONS {
        prompt.push_str("- ");
        prompt.push_str(instruction);
        prompt.push('\n');
    }
    prompt.push_str("\nPERGUNTA DO USUÁRIO:\n");
    prompt.push_str(message);
    prompt.push('\n');
    prompt
}
